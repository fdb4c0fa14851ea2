//! Sessions: one program, one run, one completion signal.
//!
//! A [`Session`] drives a source text through the pipeline
//! (transform, wrap, run) and routes the outcome to its bridge:
//!
//! ```text
//! Idle -> Parsing -> Parsed -> Running -> Completed | Faulted | Cancelled
//!                 \-> Rejected
//! ```
//!
//! `report_error` is called at most once, and `signal_completion` exactly
//! once on every path, including when the host drops the session future
//! while a request is pending.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bridge::RuntimeBridge;
use crate::diagnostics::{self, ErrorRecord};
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::runtime::{DEFAULT_RECURSION_LIMIT, Limits, MAX_RECURSION_LIMIT, Runtime};
use crate::wrapper::wrap;

/// Filename used in frame descriptors.
pub const DEFAULT_FILENAME: &str = "<exec>";

/// Native stack a session thread needs to reach the recursion limit and the
/// parser's nesting limit in an unoptimized build.
///
/// Parsing and evaluation recurse on the native stack. The usual 2 MiB of a
/// spawned thread or a `#[tokio::test]` covers only a few dozen levels, so
/// hosts should drive [`Session::run`] on a thread built with
/// `std::thread::Builder::stack_size(SESSION_STACK_SIZE)`.
pub const SESSION_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Options for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Name shown in frame descriptors
    pub filename: String,
    /// Maximum depth of user function calls. Each level costs native stack,
    /// see [`SESSION_STACK_SIZE`].
    pub recursion_limit: usize,
    /// Maximum number of executed statements (unlimited if `None`)
    pub step_limit: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            filename: DEFAULT_FILENAME.to_string(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            step_limit: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Clamped to `1..=MAX_RECURSION_LIMIT`.
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.clamp(1, MAX_RECURSION_LIMIT);
        self
    }

    pub fn step_limit(mut self, limit: Option<u64>) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn limits(&self) -> Limits {
        Limits {
            recursion_limit: self.recursion_limit,
            step_limit: self.step_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Parsing,
    Parsed,
    Running,
    Completed,
    Faulted,
    Rejected,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Faulted
                | SessionState::Rejected
                | SessionState::Cancelled
        )
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// An exception escaped the program.
    Faulted(ErrorRecord),
    /// The source did not parse; nothing ran.
    Rejected(ErrorRecord),
    /// The host tore the session down.
    Cancelled,
}

impl Outcome {
    pub fn state(&self) -> SessionState {
        match self {
            Outcome::Completed => SessionState::Completed,
            Outcome::Faulted(_) => SessionState::Faulted,
            Outcome::Rejected(_) => SessionState::Rejected,
            Outcome::Cancelled => SessionState::Cancelled,
        }
    }

    /// The record reported to the bridge, if any.
    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            Outcome::Faulted(record) | Outcome::Rejected(record) => Some(record),
            Outcome::Completed | Outcome::Cancelled => None,
        }
    }
}

/// Misuse of the session API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session already started (state: {0:?})")]
    AlreadyStarted(SessionState),
}

/// Signals completion when dropped, whichever way `run` exits.
struct CompletionGuard<'a, B: RuntimeBridge> {
    bridge: &'a B,
}

impl<B: RuntimeBridge> Drop for CompletionGuard<'_, B> {
    fn drop(&mut self) {
        self.bridge.signal_completion();
    }
}

/// One execution of one program against one bridge.
///
/// `run` needs a deep native stack for deeply nested or recursive scripts;
/// run it on a thread with [`SESSION_STACK_SIZE`] bytes of stack.
pub struct Session<B: RuntimeBridge> {
    bridge: B,
    config: SessionConfig,
    state: SessionState,
    cancel: CancellationToken,
}

impl<B: RuntimeBridge> Session<B> {
    pub fn new(bridge: B) -> Self {
        Self::with_config(bridge, SessionConfig::default())
    }

    pub fn with_config(bridge: B, config: SessionConfig) -> Self {
        Self {
            bridge,
            config,
            state: SessionState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Token that cancels the running program. Clones may be moved to other
    /// tasks or threads.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `source` to the end.
    ///
    /// Only the first call runs anything; later calls fail with
    /// [`SessionError::AlreadyStarted`] without touching the bridge.
    pub async fn run(&mut self, source: &str) -> Result<Outcome, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyStarted(self.state));
        }
        let _completion = CompletionGuard {
            bridge: &self.bridge,
        };

        self.state = SessionState::Parsing;
        let module = match sandpiper_parser::transform(source) {
            Ok(module) => module,
            Err(err) => {
                let record = diagnostics::from_parse_error(&err);
                info!(line = record.line, message = %record.message, "source rejected");
                self.bridge.report_error(&record);
                self.state = SessionState::Rejected;
                return Ok(Outcome::Rejected(record));
            }
        };
        self.state = SessionState::Parsed;

        let unit = wrap(module);
        let runtime = Runtime::seeded().with_limits(self.config.limits());
        let mut interp = Interpreter::with_runtime(runtime, &self.bridge);
        self.state = SessionState::Running;
        debug!(limits = ?self.config.limits(), "running program");

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = unit.invoke(&mut interp) => Some(result),
        };

        let outcome = match result {
            Some(Ok(())) => {
                info!(steps = interp.runtime().steps(), "program completed");
                Outcome::Completed
            }
            Some(Err(Error::Exception(raised))) => {
                let record = diagnostics::from_raised(&raised, &self.config.filename);
                info!(kind = %record.kind, line = record.line, "program faulted");
                self.bridge.report_error(&record);
                Outcome::Faulted(record)
            }
            Some(Err(Error::Abandoned)) | None => {
                info!("program cancelled");
                Outcome::Cancelled
            }
        };
        self.state = outcome.state();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .filename("main.py")
            .recursion_limit(50)
            .step_limit(Some(1000));
        assert_eq!(config.filename, "main.py");
        assert_eq!(
            config.limits(),
            Limits {
                recursion_limit: 50,
                step_limit: Some(1000)
            }
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.filename, "<exec>");
        assert_eq!(config.recursion_limit, DEFAULT_RECURSION_LIMIT);
        assert_eq!(config.step_limit, None);
    }

    #[test]
    fn test_recursion_limit_is_clamped() {
        assert_eq!(SessionConfig::new().recursion_limit(0).recursion_limit, 1);
        assert_eq!(
            SessionConfig::new().recursion_limit(1_000_000).recursion_limit,
            MAX_RECURSION_LIMIT
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Rejected.is_terminal());
        assert!(Outcome::Cancelled.state().is_terminal());
        assert_eq!(Outcome::Completed.error(), None);
    }
}
