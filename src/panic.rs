//! Panic-to-error translation for threads this crate spawns internally.
//!
//! A panic that escaped a multicast puller or a merge forwarder would orphan
//! every consumer blocked on `recv`. [`guard`] runs the thread body under
//! `catch_unwind` and turns an unwind into a [`PanicError`] the caller can
//! publish downstream before the thread exits.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::error::PanicError;

pub(crate) fn guard<F: FnOnce()>(task: &str, body: F) -> Result<(), PanicError> {
    match std::panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(()) => Ok(()),
        Err(payload) => {
            let message = describe_payload(&payload);
            tracing::error!(task, message = %message, "background task panicked");
            Err(PanicError::new(
                format!("{task}: {message}"),
                std::backtrace::Backtrace::force_capture().to_string(),
            ))
        }
    }
}

fn describe_payload(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
