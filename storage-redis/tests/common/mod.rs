// In-process stand-in for the cache server: speaks just enough of the
// wire protocol to serve the commands the adapters issue, including lazy
// per-key TTL bookkeeping.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

use storage_redis::resp::{RespCodec, Value};

struct Entry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

#[derive(Default)]
struct Store {
    strings: HashMap<String, Entry>,
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
}

impl Store {
    fn string(&mut self, key: &str) -> Option<&Entry> {
        if self.strings.get(key).is_some_and(|entry| !entry.live()) {
            self.strings.remove(key);
        }
        self.strings.get(key)
    }
}

pub struct MockRedis {
    addr: SocketAddr,
}

impl MockRedis {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Mutex::new(Store::default()));
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve(socket, store.clone()));
            }
        });
        Self { addr }
    }

    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }
}

async fn serve(socket: TcpStream, store: Arc<Mutex<Store>>) {
    let mut framed = Framed::new(socket, RespCodec);
    while let Some(Ok(request)) = framed.next().await {
        let reply = dispatch(request, &store).await;
        if framed.send(reply).await.is_err() {
            break;
        }
    }
}

async fn dispatch(request: Value, store: &Mutex<Store>) -> Value {
    let Some(args) = command_args(request) else {
        return Value::Error("ERR protocol error".to_string());
    };
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    let args: Vec<String> = args[1..]
        .iter()
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .collect();
    let mut store = store.lock().await;

    match (name.as_str(), args.as_slice()) {
        ("PING", _) => Value::Simple("PONG".to_string()),
        ("AUTH", _) | ("SELECT", _) => Value::Simple("OK".to_string()),

        ("SET", [key, value]) => {
            store.strings.insert(
                key.clone(),
                Entry {
                    data: value.clone().into_bytes(),
                    expires_at: None,
                },
            );
            Value::Simple("OK".to_string())
        }
        ("SETEX", [key, seconds, value]) => match seconds.parse::<u64>() {
            Ok(seconds) => {
                store.strings.insert(
                    key.clone(),
                    Entry {
                        data: value.clone().into_bytes(),
                        expires_at: Some(Instant::now() + Duration::from_secs(seconds)),
                    },
                );
                Value::Simple("OK".to_string())
            }
            Err(_) => Value::Error("ERR invalid expire time".to_string()),
        },
        ("SETNX", [key, value]) => {
            if store.string(key).is_some() {
                Value::Int(0)
            } else {
                store.strings.insert(
                    key.clone(),
                    Entry {
                        data: value.clone().into_bytes(),
                        expires_at: None,
                    },
                );
                Value::Int(1)
            }
        }
        ("GETSET", [key, value]) => {
            let previous = bulk_or_nil(store.string(key));
            store.strings.insert(
                key.clone(),
                Entry {
                    data: value.clone().into_bytes(),
                    expires_at: None,
                },
            );
            previous
        }
        ("GET", [key]) => bulk_or_nil(store.string(key)),
        ("MGET", keys) => {
            let replies = keys
                .iter()
                .map(|key| bulk_or_nil(store.string(key)))
                .collect();
            Value::Array(replies)
        }
        ("DEL", keys) => {
            let mut removed = 0;
            for key in keys {
                if store.strings.remove(key).is_some() {
                    removed += 1;
                }
            }
            Value::Int(removed)
        }
        ("EXPIRE", [key, seconds]) => match seconds.parse::<u64>() {
            Ok(seconds) => {
                if store.string(key).is_some() {
                    if let Some(entry) = store.strings.get_mut(key) {
                        entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                    }
                    Value::Int(1)
                } else {
                    Value::Int(0)
                }
            }
            Err(_) => Value::Error("ERR invalid expire time".to_string()),
        },
        ("PERSIST", [key]) => match store.strings.get_mut(key) {
            Some(entry) if entry.expires_at.is_some() => {
                entry.expires_at = None;
                Value::Int(1)
            }
            _ => Value::Int(0),
        },
        ("INCRBY", [key, delta]) => apply_delta(&mut store, key, delta, 1),
        ("DECRBY", [key, delta]) => apply_delta(&mut store, key, delta, -1),
        ("FLUSHDB", _) => {
            store.strings.clear();
            store.hashes.clear();
            Value::Simple("OK".to_string())
        }

        ("HSET", [bucket, field, value]) => {
            let created = store
                .hashes
                .entry(bucket.clone())
                .or_default()
                .insert(field.clone(), value.clone().into_bytes())
                .is_none();
            Value::Int(i64::from(created))
        }
        ("HSETNX", [bucket, field, value]) => {
            let fields = store.hashes.entry(bucket.clone()).or_default();
            if fields.contains_key(field) {
                Value::Int(0)
            } else {
                fields.insert(field.clone(), value.clone().into_bytes());
                Value::Int(1)
            }
        }
        ("HGET", [bucket, field]) => hash_bulk_or_nil(&store, bucket, field),
        ("HMGET", [bucket, fields @ ..]) => {
            let replies = fields
                .iter()
                .map(|field| hash_bulk_or_nil(&store, bucket, field))
                .collect();
            Value::Array(replies)
        }
        ("HDEL", [bucket, fields @ ..]) => {
            let mut removed = 0;
            if let Some(entries) = store.hashes.get_mut(bucket) {
                for field in fields {
                    if entries.remove(field).is_some() {
                        removed += 1;
                    }
                }
            }
            Value::Int(removed)
        }
        ("HKEYS", [bucket]) => {
            let names = store
                .hashes
                .get(bucket)
                .map(|entries| {
                    entries
                        .keys()
                        .map(|name| Value::Bulk(Bytes::copy_from_slice(name.as_bytes())))
                        .collect()
                })
                .unwrap_or_default();
            Value::Array(names)
        }
        ("HINCRBY", [bucket, field, delta]) => {
            let Ok(delta) = delta.parse::<i64>() else {
                return Value::Error("ERR value is not an integer or out of range".to_string());
            };
            let fields = store.hashes.entry(bucket.clone()).or_default();
            let current = match fields.get(field) {
                Some(raw) => match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                    Some(n) => n,
                    None => {
                        return Value::Error(
                            "ERR hash value is not an integer".to_string(),
                        );
                    }
                },
                None => 0i64,
            };
            let next = current + delta;
            fields.insert(field.clone(), next.to_string().into_bytes());
            Value::Int(next)
        }

        _ => Value::Error(format!("ERR unknown command '{name}'")),
    }
}

fn command_args(request: Value) -> Option<Vec<Bytes>> {
    let Value::Array(items) = request else {
        return None;
    };
    let mut args = Vec::with_capacity(items.len());
    for item in items {
        let Value::Bulk(data) = item else {
            return None;
        };
        args.push(data);
    }
    if args.is_empty() { None } else { Some(args) }
}

fn bulk_or_nil(entry: Option<&Entry>) -> Value {
    match entry {
        Some(entry) => Value::Bulk(Bytes::copy_from_slice(&entry.data)),
        None => Value::Nil,
    }
}

fn hash_bulk_or_nil(store: &Store, bucket: &str, field: &str) -> Value {
    match store.hashes.get(bucket).and_then(|entries| entries.get(field)) {
        Some(raw) => Value::Bulk(Bytes::copy_from_slice(raw)),
        None => Value::Nil,
    }
}

fn apply_delta(store: &mut Store, key: &str, delta: &str, sign: i64) -> Value {
    let Ok(delta) = delta.parse::<i64>() else {
        return Value::Error("ERR value is not an integer or out of range".to_string());
    };
    let current = match store.string(key) {
        Some(entry) => match std::str::from_utf8(&entry.data)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
        {
            Some(n) => n,
            None => {
                return Value::Error("ERR value is not an integer or out of range".to_string());
            }
        },
        None => 0,
    };
    let next = current + sign * delta;
    let expires_at = store.strings.get(key).and_then(|entry| entry.expires_at);
    store.strings.insert(
        key.to_string(),
        Entry {
            data: next.to_string().into_bytes(),
            expires_at,
        },
    );
    Value::Int(next)
}
