//! Shared wire types for the switchboard worker protocol.
//!
//! This crate defines the messages exchanged between UI contexts and the
//! data-owning worker process: correlated requests and responses, unsolicited
//! notifications, and the connection frames that carry them. Frames are
//! encoded as one JSON document per line.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{read_frame, write_frame};
pub use error::ProtoError;
pub use types::*;
