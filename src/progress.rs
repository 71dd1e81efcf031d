//! Replicate-level progress reporting and cooperative cancellation.
//!
//! Components
//! -----------------
//! * [`CancelToken`] – shared flag polled between replicate iterations. Cloning a token
//!   shares the same flag, so one clone can be handed to another thread or a signal handler.
//! * `ReplicateProgress` – a progress bar over `nsim` iterations, rendered with `indicatif`
//!   when the `progress` feature is enabled and a no-op otherwise.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::ichnos_errors::IchnosError;

/// Cooperative cancellation flag for long Monte Carlo runs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; running loops stop at their next replicate boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    #[inline]
    pub(crate) fn check(token: Option<&CancelToken>) -> Result<(), IchnosError> {
        match token {
            Some(t) if t.is_cancelled() => Err(IchnosError::Cancelled),
            _ => Ok(()),
        }
    }
}

pub(crate) struct ReplicateProgress {
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl ReplicateProgress {
    #[cfg(feature = "progress")]
    pub(crate) fn new(total: usize, label: &str) -> Self {
        let bar = ProgressBar::new(total.max(1) as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg:>12} {bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise}",
        ) {
            bar.set_style(style);
        }
        bar.set_message(label.to_string());
        ReplicateProgress { bar }
    }

    #[cfg(not(feature = "progress"))]
    pub(crate) fn new(_total: usize, _label: &str) -> Self {
        ReplicateProgress {}
    }

    #[inline]
    pub(crate) fn inc(&self) {
        #[cfg(feature = "progress")]
        self.bar.inc(1);
    }

    pub(crate) fn finish(self) {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod progress_test {
    use super::*;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(CancelToken::check(Some(&token)).is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(
            CancelToken::check(Some(&token)).unwrap_err(),
            IchnosError::Cancelled
        );
        assert!(CancelToken::check(None).is_ok());
    }
}
