//! Promise: an asynchronous, wait-once handle to an external process.
//!
//! [`Promise::run`] launches the child and returns at once. A supervisor task
//! owns the child and reports its exit status through a oneshot channel, which
//! [`Promise::wait`] consumes exactly once. Cancellation goes through a
//! [`CancellationToken`] the supervisor listens on.

use std::ffi::OsStr;
use std::fs::File;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::EngineError;

type Outcome = std::io::Result<ExitStatus>;

/// Where a child's standard stream is connected.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub enum ProcessIo {
    /// Share the parent's stream.
    #[default]
    Inherit,
    /// Connect to the null device.
    Null,
    /// Connect to an open file; each launch gets its own duplicate descriptor.
    File(Arc<File>),
}

impl ProcessIo {
    /// Bind a stream to `file`.
    #[must_use]
    pub fn file(file: File) -> Self {
        Self::File(Arc::new(file))
    }

    fn to_stdio(&self) -> std::io::Result<Stdio> {
        Ok(match self {
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
            Self::File(file) => Stdio::from(file.try_clone()?),
        })
    }
}

/// Handle to one launched external process.
///
/// A `Promise` built with [`Promise::new`] (or `Default`) was never run;
/// waiting on or cancelling it is an [`EngineError::InvalidOperation`].
#[derive(Debug, Default)]
pub struct Promise {
    program: String,
    outcome: Option<oneshot::Receiver<Outcome>>,
    cancel: Option<CancellationToken>,
}

impl Promise {
    /// An uninitialized handle that has not launched anything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `program` with `args` without waiting for it.
    ///
    /// A launch failure is not reported here; it is surfaced by
    /// [`Promise::wait`]. Must be called from within a Tokio runtime.
    pub fn run<I, S>(stdin: &ProcessIo, stdout: &ProcessIo, program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();

        match spawn_child(stdin, stdout, program, args) {
            Ok(child) => {
                tracing::debug!(program, pid = ?child.id(), "process launched");
                tokio::spawn(supervise(child, token.clone(), tx));
            }
            Err(e) => {
                tracing::debug!(program, error = %e, "process launch failed");
                let _ = tx.send(Err(e));
            }
        }

        Self {
            program: program.to_owned(),
            outcome: Some(rx),
            cancel: Some(token),
        }
    }

    /// Name of the launched program; empty for a never-run handle.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wait for the process to terminate and return its exit status.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidOperation`] if called a second time or on
    /// a never-run handle, and [`EngineError::Io`] if the process could not be
    /// launched or waited on.
    pub async fn wait(&mut self) -> Result<ExitStatus, EngineError> {
        let outcome = self.outcome.take().ok_or_else(|| {
            EngineError::InvalidOperation(format!(
                "wait called on a promise for '{}' that was never run or was already waited on",
                self.program
            ))
        })?;

        match outcome.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::Io(std::io::Error::other(format!(
                "supervisor for '{}' exited without reporting a status",
                self.program
            )))),
        }
    }

    /// Ask the process to terminate. Does not wait for it.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidOperation`] on a never-run handle.
    pub fn cancel(&self) -> Result<(), EngineError> {
        self.token()?.cancel();
        Ok(())
    }

    /// Return a guard that cancels the process when dropped.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidOperation`] on a never-run handle.
    pub fn cancel_on_drop(&self) -> Result<DropGuard, EngineError> {
        Ok(self.token()?.clone().drop_guard())
    }

    fn token(&self) -> Result<&CancellationToken, EngineError> {
        self.cancel.as_ref().ok_or_else(|| {
            EngineError::InvalidOperation(
                "cancel called on a promise that was never run".to_owned(),
            )
        })
    }
}

fn spawn_child<I, S>(
    stdin: &ProcessIo,
    stdout: &ProcessIo,
    program: &str,
    args: I,
) -> std::io::Result<Child>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(program)
        .args(args)
        .stdin(stdin.to_stdio()?)
        .stdout(stdout.to_stdio()?)
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// Own the child until it exits or is cancelled, then report its status.
async fn supervise(mut child: Child, token: CancellationToken, tx: oneshot::Sender<Outcome>) {
    let finished = tokio::select! {
        status = child.wait() => Some(status),
        () = token.cancelled() => None,
    };

    let outcome = match finished {
        Some(status) => status,
        None => {
            tracing::debug!(pid = ?child.id(), "cancelling process");
            // The child may have exited in the meantime; wait() still reaps it.
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "kill failed");
            }
            child.wait().await
        }
    };

    // The receiver is gone if the waiter gave up (e.g. on timeout).
    let _ = tx.send(outcome);
}
