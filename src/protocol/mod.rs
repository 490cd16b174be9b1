//! Key-Value Wire Protocol
//!
//! Framing spoken between `RemoteKv` and a `listvault-kv` server. One request
//! frame carries either a whole pipeline or a ping; one response frame comes
//! back for each.
//!
//! ```text
//!   request    tag u8 | len u32 BE | payload
//!              0x01 EXEC  payload = bincode(Pipeline)
//!              0x04 PING  payload = empty
//!
//!   response   status u8 | len u32 BE | payload
//!              0x00 OK     payload = bincode(Vec<KvReply>) or empty
//!              0x02 ERROR  payload = UTF-8 message
//! ```
//! Frames larger than [`MAX_PAYLOAD_SIZE`] are refused by both sides.

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_replies, decode_response, encode_command, encode_replies,
    encode_response, read_command, read_response, write_command, write_response, HEADER_SIZE,
    MAX_PAYLOAD_SIZE,
};
