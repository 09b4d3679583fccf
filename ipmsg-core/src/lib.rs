//! ipmsg protocol reference implementation: wire codec plus the flat-file
//! stores shared by the client and server binaries.

pub mod alias;
pub mod protocol;
pub mod store;
pub mod wire;

pub use alias::{AliasError, AliasStore};
pub use protocol::{Message, Response, DEFAULT_PORT, MAGIC};
pub use wire::{
    decode_request, decode_response, encode_request, encode_response, EncodeError, ParseError,
};
