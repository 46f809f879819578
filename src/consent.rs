//! Consent gate
//!
//! One yes/no decision covers the whole batch of pending records.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::consts::{CONSENT_MESSAGE, CONSENT_TITLE};

/// Host-rendered yes/no prompt
pub trait ConsentPrompt: Send + Sync {
    fn ask_yes_no(&self, title: &str, message: &str) -> bool;
}

impl<F> ConsentPrompt for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn ask_yes_no(&self, title: &str, message: &str) -> bool {
        self(title, message)
    }
}

/// Prompt for hosts that never show UI; always agrees
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSend;

impl ConsentPrompt for AlwaysSend {
    fn ask_yes_no(&self, _title: &str, _message: &str) -> bool {
        true
    }
}

pub struct ConsentGate;

impl ConsentGate {
    /// Decide whether `pending_count` records may be uploaded.
    ///
    /// The prompt is only shown when there is something to send and the
    /// session asked for consent. A prompt that panics counts as "no".
    pub fn decide(
        pending_count: usize,
        ask_before_sending: bool,
        prompt: &dyn ConsentPrompt,
    ) -> bool {
        if pending_count == 0 {
            return false;
        }
        if !ask_before_sending {
            return true;
        }
        catch_unwind(AssertUnwindSafe(|| {
            prompt.ask_yes_no(CONSENT_TITLE, CONSENT_MESSAGE)
        }))
        .unwrap_or_else(|_| {
            tracing::warn!("consent prompt panicked; treating as declined");
            false
        })
    }
}
