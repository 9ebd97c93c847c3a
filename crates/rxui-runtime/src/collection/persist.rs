#![forbid(unsafe_code)]

//! Serde support: a collection serializes as the plain sequence of its
//! items. Deserializing builds a fresh collection on the global deferred
//! scheduler; subscriptions and suppression state never travel.

use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::tracking::ChangeTrackingCollection;

impl<T: Serialize> Serialize for ChangeTrackingCollection<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Hold the item lock for the whole walk so the snapshot is consistent.
        self.with(|items| {
            let mut seq = serializer.serialize_seq(Some(items.len()))?;
            for item in items {
                seq.serialize_element(item)?;
            }
            seq.end()
        })
    }
}

impl<'de, T> Deserialize<'de> for ChangeTrackingCollection<T>
where
    T: Deserialize<'de> + Clone + Send + Sync + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(ChangeTrackingCollection::from_items(items))
    }
}
