//! Script outcomes: cooperative cancellation and faults.
//!
//! Cancellation and faults travel on separate paths. A script observes
//! [`ScriptError::Cancelled`] at a suspension point and propagates it with
//! `?`; the scheduler treats that as a clean exit. Every other error, and
//! any panic raised by script code, becomes a [`ScriptFault`] that the
//! scheduler hands to the engine's fault policy.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};

use thiserror::Error;

use crate::resources::dispatcher::DispatchError;
use crate::resources::scheduler::ScriptId;
use crate::resources::shapemanager::ShapeError;

pub type ScriptResult<T = ()> = Result<T, ScriptError>;

#[derive(Debug, Error)]
pub enum ScriptError {
    /// The thread was aborted or its owner destroyed.
    #[error("script cancelled")]
    Cancelled,
    #[error("no shape named '{0}'")]
    ShapeNotFound(String),
    #[error("no animation named '{0}'")]
    AnimationNotFound(String),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("{message}")]
    Fault {
        message: String,
        backtrace: Option<String>,
    },
}

impl ScriptError {
    /// Build a fault, capturing a backtrace when `RUST_BACKTRACE` enables it.
    pub fn fault(message: impl Into<String>) -> Self {
        let bt = Backtrace::capture();
        let backtrace = match bt.status() {
            BacktraceStatus::Captured => Some(bt.to_string()),
            _ => None,
        };
        ScriptError::Fault {
            message: message.into(),
            backtrace,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScriptError::Cancelled)
    }
}

/// An unrecoverable failure inside one script thread.
#[derive(Debug, Clone)]
pub struct ScriptFault {
    pub thread: ScriptId,
    pub name: String,
    pub message: String,
    pub backtrace: Option<String>,
    /// Raised before the thread's first suspension point.
    pub during_setup: bool,
}

impl ScriptFault {
    pub(crate) fn from_error(thread: ScriptId, name: &str, err: ScriptError) -> Self {
        let (message, backtrace) = match err {
            ScriptError::Fault { message, backtrace } => (message, backtrace),
            other => (other.to_string(), None),
        };
        ScriptFault {
            thread,
            name: name.to_string(),
            message,
            backtrace,
            during_setup: false,
        }
    }

    pub(crate) fn from_panic(thread: ScriptId, name: &str, payload: &(dyn Any + Send)) -> Self {
        ScriptFault {
            thread,
            name: name.to_string(),
            message: format!("panicked: {}", panic_message(payload)),
            backtrace: None,
            during_setup: false,
        }
    }
}

impl ScriptFault {
    /// Fault raised by a sink or hook running on the host-owning thread.
    pub(crate) fn from_callback(
        label: &str,
        payload: &(dyn Any + Send),
        during_setup: bool,
    ) -> Self {
        ScriptFault {
            thread: ScriptId::HOST,
            name: label.to_string(),
            message: format!("callback panicked: {}", panic_message(payload)),
            backtrace: None,
            during_setup,
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_not_a_fault_message() {
        assert!(ScriptError::Cancelled.is_cancelled());
        assert!(!ScriptError::fault("boom").is_cancelled());
    }

    #[test]
    fn test_fault_from_lookup_error_keeps_message() {
        let fault = ScriptFault::from_error(
            ScriptId(3),
            "cat",
            ScriptError::ShapeNotFound("dog".into()),
        );
        assert_eq!(fault.message, "no shape named 'dog'");
        assert_eq!(fault.name, "cat");
        assert!(fault.backtrace.is_none());
    }

    #[test]
    fn test_panic_message_variants() {
        let a: Box<dyn Any + Send> = Box::new("static str");
        let b: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(a.as_ref()), "static str");
        assert_eq!(panic_message(b.as_ref()), "owned");
        assert_eq!(panic_message(c.as_ref()), "<non-string panic payload>");
    }
}
