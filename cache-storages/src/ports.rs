use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::{Result, Ttl};

// Ports are the pluggable extension points for underlying cache backends

/// Capability contract every cache backend adapter satisfies.
///
/// Callers depend only on this trait; whether a flat keyspace or a hash
/// bucket serves the data is a construction-time choice. Absent keys are
/// never an error: `get` yields `""`, `get_int` yields `0`, and
/// `get_object` leaves its target untouched.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Identifier for the backing adapter, e.g. `"redis-flat"`.
    fn storage_type(&self) -> &'static str;

    /// Store a structured value, wrapped in the storage envelope.
    async fn set_object<T>(&self, key: &str, value: &T, ttl: Ttl) -> Result<()>
    where
        T: Serialize + Sync;

    /// Read a structured value into `value`. Leaves `value` untouched and
    /// succeeds when the key is absent.
    async fn get_object<T>(&self, key: &str, value: &mut T) -> Result<()>
    where
        T: DeserializeOwned + Send;

    /// Fetch every key in `key_values` in one batch. A decode failure on
    /// any key aborts the whole call and leaves every target untouched.
    async fn get_multi_object<T>(&self, key_values: &mut HashMap<String, T>) -> Result<()>
    where
        T: DeserializeOwned + Send;

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<()>;

    async fn get(&self, key: &str) -> Result<String>;

    /// Store `value` only if `key` is absent; returns whether the write won.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool>;

    /// Swap in `value` and return the previous one (`""` if absent).
    async fn get_set(&self, key: &str, value: &str) -> Result<String>;

    async fn set_int(&self, key: &str, value: i64, ttl: Ttl) -> Result<()>;

    async fn get_int(&self, key: &str) -> Result<i64>;

    /// Fetch several keys at once; absent keys map to `""`.
    async fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, String>>;

    /// Refresh the expiry on `key` where the backend supports per-key TTL;
    /// a no-op success elsewhere.
    async fn touch(&self, key: &str, ttl: Ttl) -> Result<()>;

    /// Atomically add `delta` to the integer at `key`, creating it at zero
    /// first when absent, and return the new value. Backed by the server's
    /// atomic primitive, so concurrent callers never lose updates.
    async fn increment(&self, key: &str, delta: u64) -> Result<i64>;

    /// Atomically subtract `delta`; the result may go negative.
    async fn decrement(&self, key: &str, delta: u64) -> Result<i64>;

    /// Remove `key`; removing an absent key succeeds silently.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry this adapter instance is responsible for.
    async fn delete_all(&self) -> Result<()>;
}
