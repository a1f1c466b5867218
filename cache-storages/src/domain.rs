use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::{Error, Result};

/// Envelope wrapped around every object payload before it reaches a
/// backend. The encoded shape stays stable regardless of the caller's
/// concrete type, and a stored `null` payload (`{"v":null}`) remains
/// distinguishable from an absent key because absence never reaches the
/// decode layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageValue<T> {
    #[serde(rename = "v")]
    pub value: T,
}

/// Wrap `value` in the envelope and encode it for the wire.
pub fn wrap<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(&StorageValue { value }).map_err(|source| Error::Encode {
        key: key.to_string(),
        source,
    })
}

/// Decode an envelope read back from a backend and yield the inner value.
/// Fails explicitly when the stored bytes do not match the target shape.
pub fn unwrap<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T> {
    serde_json::from_slice::<StorageValue<T>>(data)
        .map(|stored| stored.value)
        .map_err(|source| Error::Decode {
            key: key.to_string(),
            source,
        })
}
