//! Script runner - executes one external program with a timeout

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Failure of a single script run
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to run {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process error: {} timed out after {timeout:?}", program.display())]
    TimedOut { program: PathBuf, timeout: Duration },

    #[error("process error: {} exited with returncode={code:?}", program.display())]
    Exited { program: PathBuf, code: Option<i32> },
}

/// Runs action scripts on behalf of the command handlers
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Run `program` with `args` and return its trimmed stdout.
    ///
    /// The caller does not continue until the program exits or times out.
    async fn run(&self, program: &Path, args: &[&str]) -> Result<String, ActionError>;
}

/// Runs scripts as child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    /// Create a runner that kills scripts running longer than `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ActionRunner for ProcessRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> Result<String, ActionError> {
        debug!(script = %program.display(), ?args, "Running action script");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ActionError::Spawn {
                program: program.to_path_buf(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ActionError::Spawn {
                program: program.to_path_buf(),
                source,
            })?,
            Err(_) => {
                return Err(ActionError::TimedOut {
                    program: program.to_path_buf(),
                    timeout: self.timeout,
                })
            }
        };

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            let line = line.trim_end();
            if !line.is_empty() {
                info!(" ... {}: {}", program.display(), line);
            }
        }

        if !output.status.success() {
            return Err(ActionError::Exited {
                program: program.to_path_buf(),
                code: output.status.code(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
