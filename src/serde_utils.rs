use serde::{Deserialize, Deserializer};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn deserialize_optional_timestamp_millis<'de, D>(
    deserializer: D,
) -> Result<Option<SystemTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<u64>::deserialize(deserializer)?;
    Ok(millis.map(|millis| UNIX_EPOCH + std::time::Duration::from_millis(millis)))
}

/// Treats an explicit `null` the same as a missing field.
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
