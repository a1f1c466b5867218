#![deny(clippy::all)]

pub mod domain;
pub mod ports;

pub use domain::StorageValue;
pub use ports::CacheStorage;
