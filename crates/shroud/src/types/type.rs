use strum::{EnumIter, EnumString, IntoStaticStr};

/// Builtin classes registered by every runtime at start-up, in declaration order
/// (bases before subclasses).
///
/// The strum names are the Python-visible class names, so `Type::NoneType` prints as
/// `NoneType` and `"int".parse()` yields `Type::Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    Object,
    Type,
    #[strum(serialize = "NoneType")]
    NoneType,
    #[strum(serialize = "NotImplementedType")]
    NotImplementedType,
    Int,
    Bool,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    #[strum(serialize = "builtin_function_or_method")]
    Function,
    Method,
    Iterator,
}

impl Type {
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// The builtin this class derives from, `None` only for `object`.
    #[must_use]
    pub fn base(self) -> Option<Self> {
        match self {
            Self::Object => None,
            Self::Bool => Some(Self::Int),
            _ => Some(Self::Object),
        }
    }
}
