//! Sandboxed interpreter and session engine for Sandpiper scripts.
//!
//! A [`Session`] takes program source, rewrites every unshadowed `input(...)`
//! call into a suspension point, wraps the module in one asynchronous entry
//! point and runs it. All interaction with the outside world goes through a
//! [`RuntimeBridge`] supplied by the host. Script exceptions are modeled as
//! `Error::Exception` and propagate using Rust's `?` operator until a `try`
//! statement or the session catches them.

mod bridge;
mod builtins;
mod diagnostics;
mod error;
mod eval;
mod interpreter;
mod ops;
mod runtime;
mod session;
mod value;
mod wrapper;

pub use bridge::{ChannelBridge, HostEvent, InputError, RuntimeBridge};
pub use diagnostics::{ErrorRecord, from_parse_error, from_raised};
pub use error::{Error, Raised, TraceFrame};
pub use eval::Flow;
pub use interpreter::Interpreter;
pub use runtime::{DEFAULT_RECURSION_LIMIT, Limits, MAX_RECURSION_LIMIT, Runtime};
pub use session::{
    Outcome, SESSION_STACK_SIZE, Session, SessionConfig, SessionError, SessionState,
};
pub use value::{ExcClass, Value};
pub use wrapper::{ExecutableUnit, wrap};

/// Result type for interpreter operations.
pub type Result<T> = std::result::Result<T, Error>;
