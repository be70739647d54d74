use std::{borrow::Cow, fmt};

use strum::{Display, EnumString, IntoStaticStr};

use crate::resource::ResourceError;

/// Result type used by every fallible runtime and proxy operation.
pub type RunResult<T> = Result<T, RunError>;

/// Python exception types raised by the runtime.
///
/// Only the types the object model and the proxy core can actually raise are listed.
/// The `Display`/`EnumString` forms are the Python class names, so `ExcType::KeyError`
/// prints as `KeyError` and `"TypeError".parse()` round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ExcType {
    Exception,

    ArithmeticError,
    OverflowError,
    ZeroDivisionError,

    LookupError,
    IndexError,
    KeyError,

    RuntimeError,
    NotImplementedError,
    RecursionError,

    AttributeError,
    TypeError,
    ValueError,
    StopIteration,
    MemoryError,

    PickleError,
    PicklingError,
    UnpicklingError,
}

impl ExcType {
    /// Whether an `except handler:` clause would catch an exception of this type.
    #[must_use]
    pub fn is_subclass_of(self, handler: Self) -> bool {
        if self == handler {
            return true;
        }
        match handler {
            Self::Exception => true,
            Self::ArithmeticError => matches!(self, Self::OverflowError | Self::ZeroDivisionError),
            Self::LookupError => matches!(self, Self::IndexError | Self::KeyError),
            Self::RuntimeError => matches!(self, Self::NotImplementedError | Self::RecursionError),
            Self::PickleError => matches!(self, Self::PicklingError | Self::UnpicklingError),
            _ => false,
        }
    }

    pub(crate) fn with_msg(self, msg: impl Into<String>) -> RunError {
        SimpleException::new(self, Some(msg.into())).into()
    }

    // ============================================================================
    // Generic constructors
    // ============================================================================

    pub(crate) fn type_error(msg: impl Into<String>) -> RunError {
        Self::TypeError.with_msg(msg)
    }

    pub(crate) fn value_error(msg: impl Into<String>) -> RunError {
        Self::ValueError.with_msg(msg)
    }

    pub(crate) fn runtime_error(msg: impl Into<String>) -> RunError {
        Self::RuntimeError.with_msg(msg)
    }

    pub(crate) fn overflow_error(msg: impl Into<String>) -> RunError {
        Self::OverflowError.with_msg(msg)
    }

    pub(crate) fn zero_division(msg: impl Into<String>) -> RunError {
        Self::ZeroDivisionError.with_msg(msg)
    }

    pub(crate) fn index_error(type_name: &str) -> RunError {
        Self::IndexError.with_msg(format!("{type_name} index out of range"))
    }

    /// `KeyError` carries the repr of the missing key, as CPython does.
    pub(crate) fn key_error(key_repr: String) -> RunError {
        Self::KeyError.with_msg(key_repr)
    }

    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> RunError {
        Self::AttributeError.with_msg(format!("'{type_name}' object has no attribute '{attr}'"))
    }

    pub(crate) fn class_attribute_error(class_name: &str, attr: &str) -> RunError {
        Self::AttributeError.with_msg(format!("type object '{class_name}' has no attribute '{attr}'"))
    }

    pub(crate) fn binary_type_error(op: &str, lhs: &str, rhs: &str) -> RunError {
        Self::type_error(format!("unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'"))
    }

    pub(crate) fn unary_type_error(op: &str, operand: &str) -> RunError {
        Self::type_error(format!("bad operand type for unary {op}: '{operand}'"))
    }

    pub(crate) fn compare_type_error(op: &str, lhs: &str, rhs: &str) -> RunError {
        Self::type_error(format!("'{op}' not supported between instances of '{lhs}' and '{rhs}'"))
    }

    pub(crate) fn not_callable(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object is not callable"))
    }

    pub(crate) fn unhashable(type_name: &str) -> RunError {
        Self::type_error(format!("unhashable type: '{type_name}'"))
    }

    pub(crate) fn arg_count(func: &str, expected: usize, got: usize) -> RunError {
        let plural = if expected == 1 { "" } else { "s" };
        Self::type_error(format!("{func} expected {expected} argument{plural}, got {got}"))
    }

    pub(crate) fn no_kwargs(func: &str) -> RunError {
        Self::type_error(format!("{func}() takes no keyword arguments"))
    }

    // ============================================================================
    // Proxy failures
    // ============================================================================

    /// An absent target was supplied where one is mandatory.
    pub(crate) fn invalid_target() -> RunError {
        Self::value_error("cannot create proxy around NULL")
    }

    /// An attribute was requested on a proxy whose target is absent.
    pub(crate) fn null_target_attr(action: &str, attr: &str) -> RunError {
        Self::runtime_error(format!("object is NULL; requested to {action} attribute '{attr}'"))
    }

    /// A forwarded operation met a proxy whose target is absent.
    pub(crate) fn null_target() -> RunError {
        Self::runtime_error("proxied object is NULL")
    }

    pub(crate) fn expected_proxy(type_name: &str) -> RunError {
        Self::type_error(format!("expected proxy object, got {type_name}"))
    }

    pub(crate) fn proxy_kwargs(method: &str) -> RunError {
        Self::type_error(format!("proxy.{method} does not accept keyword args"))
    }

    pub(crate) fn proxy_not_picklable() -> RunError {
        Self::PicklingError.with_msg("proxy instances cannot be pickled")
    }
}

/// A raised exception: its type plus the optional message argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleException {
    exc_type: ExcType,
    arg: Option<String>,
}

impl SimpleException {
    #[must_use]
    pub fn new(exc_type: ExcType, arg: Option<String>) -> Self {
        Self { exc_type, arg }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}: {arg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

/// Error type for runtime operations.
#[derive(Debug, Clone)]
pub enum RunError {
    /// A Python exception that callers may inspect and handle.
    Exc(SimpleException),
    /// A configured resource limit was hit.
    Resource(ResourceError),
    /// Broken internal invariant; never expected in correct use.
    Internal(Cow<'static, str>),
}

impl RunError {
    /// The Python exception type this error surfaces as.
    ///
    /// Resource errors map to `RecursionError` or `MemoryError`; internal errors have none.
    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        match self {
            Self::Exc(exc) => Some(exc.exc_type()),
            Self::Resource(ResourceError::Recursion { .. }) => Some(ExcType::RecursionError),
            Self::Resource(_) => Some(ExcType::MemoryError),
            Self::Internal(_) => None,
        }
    }

    /// Whether `except handler:` would catch this error.
    #[must_use]
    pub fn matches(&self, handler: ExcType) -> bool {
        self.exc_type().is_some_and(|exc_type| exc_type.is_subclass_of(handler))
    }

    /// The message argument, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Exc(exc) => exc.arg().map(str::to_owned),
            Self::Resource(err) => Some(err.to_string()),
            Self::Internal(msg) => Some(msg.to_string()),
        }
    }

    pub(crate) fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exc(exc) => write!(f, "{exc}"),
            Self::Resource(err @ ResourceError::Recursion { .. }) => write!(f, "RecursionError: {err}"),
            Self::Resource(err) => write!(f, "MemoryError: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(exc)
    }
}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}
