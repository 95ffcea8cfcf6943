//! Session shell for the emulated BMC
//!
//! This module handles:
//! - Receiving and deframing IPMI-over-LAN datagrams
//! - Logging clients in (IPMI 1.5 straight password or RMCP+ RAKP) and
//!   tracking their sessions
//! - Handing authenticated requests to the command dispatcher
//! - Framing and sending the responses

mod frame;
mod lan;
mod manager;
mod rakp;
mod rmcp_plus;
mod shell;

#[cfg(test)]
mod testing;

pub use lan::LanShell;
pub use shell::SessionShell;
