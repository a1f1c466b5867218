// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Construction-time failure: the endpoint could not be reached, or
    /// AUTH / SELECT was rejected while dialing.
    #[error("connect: {0}")]
    Connect(String),
    #[error("encode value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("decode value for key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// Command-level failure reported by the server, e.g. an increment on
    /// a value that is not an integer.
    #[error("backend: {0}")]
    Backend(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Expiry in whole seconds; zero means the entry never expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ttl(pub u64);

impl Ttl {
    pub const NONE: Ttl = Ttl(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }
}

pub mod config;
