//! Network Module
//!
//! TCP server and client handling for the key-value service.
//!
//! ## Architecture
//! - Single acceptor loop (non-blocking, polls a shutdown flag)
//! - One worker thread per connection, bounded by `max_connections`
//! - Commands executed against a shared `KvStore`

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;
