//! Structured data stored inside heap entries.
//!
//! These types only own and expose their contents. Behaviour that needs to call back
//! into the object model (hashing keys, invoking methods, iterating) lives on
//! `Runtime`.
pub mod class;
pub mod dict;
pub mod function;
pub mod iter;
pub mod r#type;

pub use class::{Accessor, ClassAttr};
pub(crate) use class::{ClassObject, Instance, compute_c3_mro};
pub(crate) use dict::Dict;
pub use function::NativeFunction;
pub(crate) use function::BoundMethod;
pub(crate) use iter::SeqIter;
pub use r#type::Type;
