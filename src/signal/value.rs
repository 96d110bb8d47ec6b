//! Key/value payload carried by `with_value` nodes.

use std::any::Any;
use std::fmt;

/// A single key/value pair attached to one node.
///
/// Keys are plain `&'static str` names. Avoiding collisions between unrelated
/// components is caller discipline: prefix keys with the owning module path.
pub(crate) struct ValueEntry {
    pub(crate) key: &'static str,
    pub(crate) value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ValueEntry {
    pub(crate) fn new<V>(key: &'static str, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        Self {
            key,
            value: Box::new(value),
            type_name: std::any::type_name::<V>(),
        }
    }
}

impl fmt::Display for ValueEntry {
    /// Strings render quoted; anything else renders as its type name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.value.downcast_ref::<String>() {
            write!(f, "{}, {:?}", self.key, s)
        } else if let Some(s) = self.value.downcast_ref::<&'static str>() {
            write!(f, "{}, {:?}", self.key, s)
        } else {
            write!(f, "{}, <{}>", self.key, self.type_name)
        }
    }
}
