use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use cache_storages::{CacheStorage, domain};
use shared::config::Config;
use shared::{Result, Ttl};

use crate::pool::ConnectionPool;
use crate::resp::{Command, Value};
use crate::signed_delta;

pub const DEFAULT_BUCKET: &str = "hash_key";

/// Adapter that folds the whole keyspace into fields of one named hash
/// bucket.
///
/// Per-field TTL does not exist at this granularity: the `ttl` passed to
/// writes is accepted but not enforced, and `touch` succeeds without
/// effect. `delete_all` clears only the adapter's own bucket.
pub struct HashStorage {
    pool: ConnectionPool,
    bucket: String,
}

impl HashStorage {
    /// Connect using the default bucket name.
    pub async fn connect(endpoint: &str, index: i64) -> Result<Self> {
        Self::new(
            ConnectionPool::new(endpoint, Some(index), None),
            DEFAULT_BUCKET.to_string(),
        )
        .await
    }

    /// Connect to a password-protected server.
    pub async fn connect_with_auth(endpoint: &str, index: i64, auth: &str) -> Result<Self> {
        Self::new(
            ConnectionPool::new(endpoint, Some(index), Some(auth.to_string())),
            DEFAULT_BUCKET.to_string(),
        )
        .await
    }

    /// Connect with a caller-chosen bucket, for several independent
    /// keyspaces on one database.
    pub async fn with_bucket(endpoint: &str, index: i64, bucket: &str) -> Result<Self> {
        Self::new(
            ConnectionPool::new(endpoint, Some(index), None),
            bucket.to_string(),
        )
        .await
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            ConnectionPool::with_limits(
                config.endpoint.clone(),
                config.db_index,
                config.auth.clone(),
                config.max_idle,
                config.idle_timeout,
            ),
            config.bucket.clone(),
        )
        .await
    }

    async fn new(pool: ConnectionPool, bucket: String) -> Result<Self> {
        pool.probe().await?;
        Ok(Self { pool, bucket })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Borrow one pooled connection for exactly one command round trip.
    async fn command(&self, cmd: Command) -> Result<Value> {
        let mut conn = self.pool.get().await?;
        let reply = conn.command(cmd).await;
        self.pool.put(conn).await;
        reply
    }

    async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        self.command(Command::new("HSET").arg(&self.bucket).arg(key).arg(value))
            .await
            .map(|_| ())
    }

    async fn fetch(&self, key: &str) -> Result<Value> {
        self.command(Command::new("HGET").arg(&self.bucket).arg(key))
            .await
    }

    async fn fetch_multi(&self, keys: &[&str]) -> Result<Vec<Value>> {
        let mut cmd = Command::new("HMGET").arg(&self.bucket);
        for key in keys {
            cmd = cmd.arg(key);
        }
        self.command(cmd).await?.into_array()
    }

    /// Both increment directions funnel through the one signed HINCRBY
    /// path so they cannot drift apart.
    async fn hincrby(&self, key: &str, delta: i64) -> Result<i64> {
        self.command(
            Command::new("HINCRBY")
                .arg(&self.bucket)
                .arg(key)
                .arg(delta.to_string()),
        )
        .await?
        .into_i64()
    }
}

#[async_trait]
impl CacheStorage for HashStorage {
    fn storage_type(&self) -> &'static str {
        "redis-hash"
    }

    async fn set_object<T>(&self, key: &str, value: &T, _ttl: Ttl) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let data = domain::wrap(key, value)?;
        self.store(key, &data).await
    }

    async fn get_object<T>(&self, key: &str, value: &mut T) -> Result<()>
    where
        T: DeserializeOwned + Send,
    {
        match self.fetch(key).await?.into_bulk()? {
            Some(data) => {
                *value = domain::unwrap(key, &data)?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn get_multi_object<T>(&self, key_values: &mut HashMap<String, T>) -> Result<()>
    where
        T: DeserializeOwned + Send,
    {
        if key_values.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = key_values.keys().cloned().collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let replies = self.fetch_multi(&key_refs).await?;

        // Decode everything before touching any target: a bad entry must
        // not leave the batch half-applied.
        let mut decoded: Vec<(String, T)> = Vec::with_capacity(replies.len());
        for (key, reply) in keys.iter().zip(replies) {
            if let Some(data) = reply.into_bulk()? {
                decoded.push((key.clone(), domain::unwrap(key, &data)?));
            }
        }
        for (key, value) in decoded {
            key_values.insert(key, value);
        }
        Ok(())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Ttl) -> Result<()> {
        self.store(key, value.as_bytes()).await
    }

    async fn get(&self, key: &str) -> Result<String> {
        self.fetch(key).await?.into_string()
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        self.command(
            Command::new("HSETNX")
                .arg(&self.bucket)
                .arg(key)
                .arg(value),
        )
        .await?
        .into_bool()
    }

    async fn get_set(&self, key: &str, value: &str) -> Result<String> {
        // No field-level GETSET exists; read-then-write is two commands,
        // and a concurrent writer can interleave between them.
        let previous = self.fetch(key).await?.into_string()?;
        self.store(key, value.as_bytes()).await?;
        Ok(previous)
    }

    async fn set_int(&self, key: &str, value: i64, _ttl: Ttl) -> Result<()> {
        self.store(key, value.to_string().as_bytes()).await
    }

    async fn get_int(&self, key: &str) -> Result<i64> {
        self.fetch(key).await?.into_i64()
    }

    async fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let replies = self.fetch_multi(keys).await?;
        let mut values = HashMap::with_capacity(keys.len());
        for (key, reply) in keys.iter().zip(replies) {
            values.insert((*key).to_string(), reply.into_string()?);
        }
        Ok(values)
    }

    /// Field-level expiry is unsupported, so this succeeds without doing
    /// anything; entries in the bucket are never evicted by TTL.
    async fn touch(&self, _key: &str, _ttl: Ttl) -> Result<()> {
        Ok(())
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<i64> {
        self.hincrby(key, signed_delta(delta)?).await
    }

    async fn decrement(&self, key: &str, delta: u64) -> Result<i64> {
        self.hincrby(key, -signed_delta(delta)?).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.command(Command::new("HDEL").arg(&self.bucket).arg(key))
            .await
            .map(|_| ())
    }

    /// Enumerate the bucket's fields, then delete them one by one. Not
    /// atomic: a field written after the enumeration survives the clear,
    /// and a failure mid-way leaves a deterministic prefix removed.
    async fn delete_all(&self) -> Result<()> {
        let fields = self
            .command(Command::new("HKEYS").arg(&self.bucket))
            .await?
            .into_array()?;
        let mut names = Vec::with_capacity(fields.len());
        for field in fields {
            names.push(field.into_string()?);
        }
        names.sort();
        for name in names {
            self.command(Command::new("HDEL").arg(&self.bucket).arg(&name))
                .await?;
        }
        Ok(())
    }
}
