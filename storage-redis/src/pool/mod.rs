use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use shared::{Error, Result};

use crate::resp::{Command, RespCodec, Value};

pub const DEFAULT_MAX_IDLE: usize = 3;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// One established connection to the cache server.
pub struct Conn {
    framed: Framed<TcpStream, RespCodec>,
    broken: bool,
}

impl Conn {
    /// Transport connect, then the optional credential exchange and
    /// logical-database selection. Any rejection fails the whole dial.
    async fn dial(endpoint: &str, auth: Option<&str>, index: Option<i64>) -> Result<Self> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| Error::Connect(format!("{endpoint}: {e}")))?;
        stream.set_nodelay(true).ok();

        let mut conn = Self {
            framed: Framed::new(stream, RespCodec),
            broken: false,
        };
        if let Some(password) = auth {
            conn.command(Command::new("AUTH").arg(password))
                .await
                .map_err(|e| Error::Connect(format!("auth rejected by {endpoint}: {e}")))?;
        }
        if let Some(index) = index {
            conn.command(Command::new("SELECT").arg(index.to_string()))
                .await
                .map_err(|e| Error::Connect(format!("select {index} rejected by {endpoint}: {e}")))?;
        }
        Ok(conn)
    }

    /// Issue one command and read its reply. An error reply from the
    /// server becomes `Error::Backend` and leaves the connection
    /// reusable; a transport or framing failure marks it broken so the
    /// pool discards it on release.
    pub async fn command(&mut self, cmd: Command) -> Result<Value> {
        trace!(command = cmd.name(), "issuing");
        if let Err(e) = self.framed.send(cmd).await {
            self.broken = true;
            return Err(e);
        }
        match self.framed.next().await {
            Some(Ok(Value::Error(msg))) => Err(Error::Backend(msg)),
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => {
                self.broken = true;
                Err(e)
            }
            None => {
                self.broken = true;
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-command",
                )))
            }
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

struct IdleConn {
    conn: Conn,
    since: Instant,
}

/// Pool of reusable connections to one server endpoint.
///
/// Borrowing never blocks on capacity: when the idle set is empty a fresh
/// connection is dialed. Only the idle set is bounded (`max_idle`), and
/// connections idle past `idle_timeout` are closed lazily on the next
/// borrow. A borrowed connection is exclusively owned by its caller until
/// released with [`ConnectionPool::put`].
pub struct ConnectionPool {
    endpoint: String,
    auth: Option<String>,
    index: Option<i64>,
    max_idle: usize,
    idle_timeout: Duration,
    idle: Mutex<Vec<IdleConn>>,
}

impl ConnectionPool {
    pub fn new(endpoint: impl Into<String>, index: Option<i64>, auth: Option<String>) -> Self {
        Self::with_limits(endpoint, index, auth, DEFAULT_MAX_IDLE, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_limits(
        endpoint: impl Into<String>,
        index: Option<i64>,
        auth: Option<String>,
        max_idle: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth,
            index,
            max_idle,
            idle_timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Borrow-and-release once, so a bad endpoint, credential or database
    /// index surfaces at construction time instead of on first use.
    pub async fn probe(&self) -> Result<()> {
        let conn = self.get().await?;
        self.put(conn).await;
        Ok(())
    }

    /// Borrow a connection, reusing the most recently released idle one
    /// when available.
    pub async fn get(&self) -> Result<Conn> {
        {
            let now = Instant::now();
            let mut idle = self.idle.lock().await;
            idle.retain(|entry| now.duration_since(entry.since) < self.idle_timeout);
            if let Some(entry) = idle.pop() {
                return Ok(entry.conn);
            }
        }
        debug!(endpoint = %self.endpoint, "dialing new connection");
        Conn::dial(&self.endpoint, self.auth.as_deref(), self.index).await
    }

    /// Release a borrowed connection. Broken connections are closed
    /// instead of returned, as is any overflow beyond `max_idle`.
    pub async fn put(&self, conn: Conn) {
        if conn.is_broken() {
            warn!(endpoint = %self.endpoint, "discarding broken connection");
            return;
        }
        let mut idle = self.idle.lock().await;
        if idle.len() < self.max_idle {
            idle.push(IdleConn {
                conn,
                since: Instant::now(),
            });
        }
    }
}
