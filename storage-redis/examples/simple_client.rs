use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use cache_storages::CacheStorage;
use shared::Ttl;
use shared::config::Config;
use storage_redis::{FlatStorage, HashStorage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct Session {
    user: String,
    visits: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    println!("Connecting to {}", config.endpoint);

    let flat = FlatStorage::from_config(&config).await?;
    let hash = HashStorage::from_config(&config).await?;

    println!("\n=== Strings ({}) ===", flat.storage_type());
    flat.set("greeting", "hello", Ttl(60)).await?;
    println!("greeting = {:?}", flat.get("greeting").await?);
    println!("missing  = {:?}", flat.get("missing").await?);

    println!("\n=== Objects ({}) ===", hash.storage_type());
    let session = Session {
        user: "edison".to_string(),
        visits: 1,
    };
    hash.set_object("session:1", &session, Ttl::NONE).await?;
    let mut reply = Session::default();
    hash.get_object("session:1", &mut reply).await?;
    println!("session:1 = {reply:?}");

    println!("\n=== Counters ===");
    println!("flat counter: {}", flat.increment("hits", 1).await?);
    println!("hash counter: {}", hash.increment("hits", 1).await?);
    println!("hash counter after decrement(3): {}", hash.decrement("hits", 3).await?);

    println!("\n=== Multi-get ===");
    flat.set("a", "1", Ttl::NONE).await?;
    flat.set("b", "2", Ttl::NONE).await?;
    let values: HashMap<String, String> = flat.get_multi(&["a", "b", "c"]).await?;
    println!("{values:?}");

    println!("\n=== Cleanup ===");
    hash.delete_all().await?;
    println!("cleared bucket {:?}", hash.bucket());

    Ok(())
}
