#![deny(clippy::all)]

pub mod pool;
pub mod resp;

mod flat;
mod hash;

pub use flat::FlatStorage;
pub use hash::{DEFAULT_BUCKET, HashStorage};

use shared::{Error, Result};

/// Deltas travel signed on the wire; a magnitude beyond `i64` cannot be
/// represented there.
pub(crate) fn signed_delta(delta: u64) -> Result<i64> {
    i64::try_from(delta)
        .map_err(|_| Error::Backend(format!("delta {delta} exceeds the integer range")))
}
