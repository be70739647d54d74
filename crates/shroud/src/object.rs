use std::fmt::{self, Write};

/// A value that can be moved into or out of a [`Runtime`](crate::Runtime).
///
/// Owns all its data, so unlike the internal `Value` it can be cloned, compared,
/// stored and serialized without a heap.
///
/// `Repr` is output-only: it stands for values with no structural mapping (classes,
/// functions, instances, proxies) and carries their `repr()`.
///
/// The derived serde impls are used for the binary format of `Runtime::dumps`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Object {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Self>),
    Tuple(Vec<Self>),
    /// Key/value pairs in insertion order.
    Dict(Vec<(Self, Self)>),
    /// `repr()` of a value that cannot be represented structurally.
    Repr(String),
}

impl Object {
    /// Python-style representation.
    fn repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{v:.1}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::List(items) => {
                f.write_char('[')?;
                write_items(f, items)?;
                f.write_char(']')
            }
            Self::Tuple(items) => {
                f.write_char('(')?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Self::Dict(pairs) => {
                f.write_char('{')?;
                for (n, (key, value)) in pairs.iter().enumerate() {
                    if n > 0 {
                        f.write_str(", ")?;
                    }
                    key.repr_fmt(f)?;
                    f.write_str(": ")?;
                    value.repr_fmt(f)?;
                }
                f.write_char('}')
            }
            Self::Repr(s) => f.write_str(s),
        }
    }

    /// Python-style `repr()` of the value.
    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut out = String::new();
        let _ = self.repr_fmt(&mut out);
        out
    }
}

fn write_items(f: &mut impl Write, items: &[Object]) -> fmt::Result {
    for (n, item) in items.iter().enumerate() {
        if n > 0 {
            f.write_str(", ")?;
        }
        item.repr_fmt(f)?;
    }
    Ok(())
}

/// `str()`-like display: strings print bare, everything else as its repr.
impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            _ => self.repr_fmt(f),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            // bitwise, so that NaN equals itself
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) | (Self::Repr(a), Self::Repr(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_follows_python() {
        let obj = Object::Dict(vec![(
            Object::from("a"),
            Object::Tuple(vec![Object::Int(1)]),
        )]);
        assert_eq!(obj.py_repr(), "{'a': (1,)}");
        assert_eq!(Object::Float(2.0).to_string(), "2.0");
        assert_eq!(Object::from("x").to_string(), "x");
    }
}
