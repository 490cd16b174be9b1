//! Remote key-value backend
//!
//! Client for a `listvault-kv` server. Each pipeline is one request frame and
//! one response frame on a pooled connection.

use std::io::{self, BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{ErrorKind, Result, VaultError};
use crate::protocol::{decode_replies, read_response, write_command, Command, Status};

use super::{KvReply, KvStore, Pipeline};

/// Idle connections kept for reuse
const MAX_IDLE_CONNECTIONS: usize = 8;

struct RemoteConnection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl RemoteConnection {
    fn open(addr: &str, timeout: Duration) -> Result<Self> {
        let socket_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| VaultError::Config(format!("unresolvable address: {}", addr)))?;

        let stream = TcpStream::connect_timeout(&socket_addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    fn round_trip(&mut self, command: &Command) -> Result<crate::protocol::Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }
}

/// Key-value store reached over TCP
pub struct RemoteKv {
    addr: String,
    timeout: Duration,
    idle: Mutex<Vec<RemoteConnection>>,
}

impl RemoteKv {
    /// Connect to `addr` and verify the server answers a ping
    pub fn connect(addr: impl Into<String>, timeout: Duration) -> Result<Self> {
        let kv = Self {
            addr: addr.into(),
            timeout,
            idle: Mutex::new(Vec::new()),
        };
        kv.ping()?;
        Ok(kv)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Health check
    pub fn ping(&self) -> Result<()> {
        let response = self.request(&Command::Ping)?;
        if response.payload != b"PONG" {
            return Err(VaultError::Protocol(format!(
                "unexpected ping reply: {:?}",
                response.message()
            )));
        }
        Ok(())
    }

    /// Send one command, retrying once on a pooled connection the server
    /// had already closed
    ///
    /// Any other failure (a timeout waiting for the reply in particular) is
    /// not re-sent, since the server may have executed the command.
    fn request(&self, command: &Command) -> Result<crate::protocol::Response> {
        let pooled = self.idle.lock().pop();

        let response = match pooled {
            Some(mut conn) => match conn.round_trip(command) {
                Ok(response) => {
                    self.release(conn);
                    response
                }
                Err(VaultError::Io(e)) if is_closed(e.kind()) => {
                    tracing::debug!(addr = %self.addr, error = %e, "Discarding stale connection");
                    self.fresh_round_trip(command)?
                }
                Err(e) => return Err(transient(e)),
            },
            None => self.fresh_round_trip(command)?,
        };

        match response.status {
            Status::Ok => Ok(response),
            Status::Error => Err(self.server_error(&response)),
        }
    }

    /// Only transient server failures stay retryable
    fn server_error(&self, response: &crate::protocol::Response) -> VaultError {
        let (kind, message) = response.failure_kind();
        let message = format!("server {} reported: {}", self.addr, message);
        match kind {
            Some(ErrorKind::TransientStore) => VaultError::TransientStore(message),
            Some(ErrorKind::Corrupt) => VaultError::Corrupt(message),
            _ => VaultError::Protocol(message),
        }
    }

    fn fresh_round_trip(&self, command: &Command) -> Result<crate::protocol::Response> {
        let mut conn = RemoteConnection::open(&self.addr, self.timeout).map_err(transient)?;
        let response = conn.round_trip(command).map_err(transient)?;
        self.release(conn);
        Ok(response)
    }

    fn release(&self, conn: RemoteConnection) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }
}

impl KvStore for RemoteKv {
    fn execute(&self, pipeline: &Pipeline) -> Result<Vec<KvReply>> {
        let response = self.request(&Command::Exec {
            pipeline: pipeline.clone(),
        })?;
        let replies = decode_replies(&response.payload)?;

        if replies.len() != pipeline.len() {
            return Err(VaultError::Protocol(format!(
                "pipeline of {} commands answered with {} replies",
                pipeline.len(),
                replies.len()
            )));
        }
        Ok(replies)
    }
}

/// The peer closed the connection (an idle connection it timed out)
fn is_closed(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// Network failures are worth retrying
fn transient(e: VaultError) -> VaultError {
    match e {
        VaultError::Io(io) => VaultError::TransientStore(format!("connection error: {}", io)),
        other => other,
    }
}
