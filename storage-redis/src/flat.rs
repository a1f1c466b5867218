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

/// Adapter for a flat keyspace: every logical key is an independent
/// top-level entry with its own server-enforced TTL.
///
/// `delete_all` flushes the adapter's entire logical database, so dedicate
/// one database index per instance; sharing an index means the flush
/// removes keys this adapter never wrote.
pub struct FlatStorage {
    pool: ConnectionPool,
}

impl FlatStorage {
    /// Connect to `endpoint` and select the given logical database,
    /// failing fast when either is wrong.
    pub async fn connect(endpoint: &str, index: i64) -> Result<Self> {
        Self::new(ConnectionPool::new(endpoint, Some(index), None)).await
    }

    /// Connect to a password-protected server.
    pub async fn connect_with_auth(endpoint: &str, index: i64, auth: &str) -> Result<Self> {
        Self::new(ConnectionPool::new(endpoint, Some(index), Some(auth.to_string()))).await
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::new(ConnectionPool::with_limits(
            config.endpoint.clone(),
            config.db_index,
            config.auth.clone(),
            config.max_idle,
            config.idle_timeout,
        ))
        .await
    }

    async fn new(pool: ConnectionPool) -> Result<Self> {
        pool.probe().await?;
        Ok(Self { pool })
    }

    /// Borrow one pooled connection for exactly one command round trip.
    async fn command(&self, cmd: Command) -> Result<Value> {
        let mut conn = self.pool.get().await?;
        let reply = conn.command(cmd).await;
        self.pool.put(conn).await;
        reply
    }

    async fn store(&self, key: &str, value: &[u8], ttl: Ttl) -> Result<()> {
        let cmd = if ttl.is_none() {
            Command::new("SET").arg(key).arg(value)
        } else {
            Command::new("SETEX")
                .arg(key)
                .arg(ttl.as_secs().to_string())
                .arg(value)
        };
        self.command(cmd).await.map(|_| ())
    }

    async fn fetch_multi(&self, keys: &[&str]) -> Result<Vec<Value>> {
        let mut cmd = Command::new("MGET");
        for key in keys {
            cmd = cmd.arg(key);
        }
        self.command(cmd).await?.into_array()
    }
}

#[async_trait]
impl CacheStorage for FlatStorage {
    fn storage_type(&self) -> &'static str {
        "redis-flat"
    }

    async fn set_object<T>(&self, key: &str, value: &T, ttl: Ttl) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let data = domain::wrap(key, value)?;
        self.store(key, &data, ttl).await
    }

    async fn get_object<T>(&self, key: &str, value: &mut T) -> Result<()>
    where
        T: DeserializeOwned + Send,
    {
        match self.command(Command::new("GET").arg(key)).await?.into_bulk()? {
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

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<()> {
        self.store(key, value.as_bytes(), ttl).await
    }

    async fn get(&self, key: &str) -> Result<String> {
        self.command(Command::new("GET").arg(key)).await?.into_string()
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        self.command(Command::new("SETNX").arg(key).arg(value))
            .await?
            .into_bool()
    }

    async fn get_set(&self, key: &str, value: &str) -> Result<String> {
        self.command(Command::new("GETSET").arg(key).arg(value))
            .await?
            .into_string()
    }

    async fn set_int(&self, key: &str, value: i64, ttl: Ttl) -> Result<()> {
        self.store(key, value.to_string().as_bytes(), ttl).await
    }

    async fn get_int(&self, key: &str) -> Result<i64> {
        self.command(Command::new("GET").arg(key)).await?.into_i64()
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

    async fn touch(&self, key: &str, ttl: Ttl) -> Result<()> {
        let cmd = if ttl.is_none() {
            // EXPIRE with 0 would delete the key; dropping the expiry
            // keeps "zero means no expiry" consistent with `set`.
            Command::new("PERSIST").arg(key)
        } else {
            Command::new("EXPIRE").arg(key).arg(ttl.as_secs().to_string())
        };
        self.command(cmd).await.map(|_| ())
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<i64> {
        let delta = signed_delta(delta)?;
        self.command(Command::new("INCRBY").arg(key).arg(delta.to_string()))
            .await?
            .into_i64()
    }

    async fn decrement(&self, key: &str, delta: u64) -> Result<i64> {
        let delta = signed_delta(delta)?;
        self.command(Command::new("DECRBY").arg(key).arg(delta.to_string()))
            .await?
            .into_i64()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.command(Command::new("DEL").arg(key)).await.map(|_| ())
    }

    async fn delete_all(&self) -> Result<()> {
        self.command(Command::new("FLUSHDB")).await.map(|_| ())
    }
}
