//! External action scripts
//!
//! Every managed-host interaction is a run of one configured script:
//! `script <managed_host> [action_or_param]`. This module runs it with a
//! bounded timeout, logs its stderr and returns its trimmed stdout.

mod runner;

pub use runner::{ActionError, ActionRunner, ProcessRunner};
