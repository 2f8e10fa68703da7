//! Helpers for sparse update payloads
//!
//! Nullable fields in a patch are `Option<Option<T>>`: `None` leaves the
//! field alone, `Some(None)` clears it and `Some(Some(v))` sets it.

use serde::{Deserialize, Deserializer};

/// Keeps an explicit JSON `null` distinguishable from an absent key.
///
/// Use with `#[serde(default, deserialize_with = "nullable")]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
