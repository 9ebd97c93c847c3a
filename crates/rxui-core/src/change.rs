#![forbid(unsafe_code)]

//! Property-change notification record.

use std::any::Any;
use std::sync::Arc;

/// Type-erased, cheaply clonable property value.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete value as a [`PropertyValue`].
pub fn property_value<V: Any + Send + Sync>(value: V) -> PropertyValue {
    Arc::new(value)
}

/// "`property_name` on `sender` changed (or is about to change) to `value`."
#[derive(Clone)]
pub struct ObservedChange<S, V> {
    pub sender: S,
    pub property_name: String,
    pub value: V,
}

impl<S, V> ObservedChange<S, V> {
    pub fn new(sender: S, property_name: impl Into<String>, value: V) -> Self {
        Self {
            sender,
            property_name: property_name.into(),
            value,
        }
    }

    /// Same sender and name, different value.
    pub fn with_value<W>(self, value: W) -> ObservedChange<S, W> {
        ObservedChange {
            sender: self.sender,
            property_name: self.property_name,
            value,
        }
    }
}

impl<S> ObservedChange<S, PropertyValue> {
    /// Downcast the erased value.
    pub fn value_as<V: Any>(&self) -> Option<&V> {
        self.value.downcast_ref::<V>()
    }
}

impl<S: std::fmt::Debug, V> std::fmt::Debug for ObservedChange<S, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedChange")
            .field("sender", &self.sender)
            .field("property_name", &self.property_name)
            .finish_non_exhaustive()
    }
}
