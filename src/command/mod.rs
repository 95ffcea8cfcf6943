//! Command dispatch for the emulated BMC
//!
//! This module handles:
//! - Mapping (netfn, command) pairs onto the supported operations
//! - Decoding request payloads and running the matching action script
//! - Encoding responses and completion codes
//! - Containing every handler failure to the request that caused it

mod dispatcher;
pub mod handlers;

pub use dispatcher::CommandDispatcher;
