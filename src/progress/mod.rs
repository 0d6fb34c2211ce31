//! Progress and cancellation channel
//!
//! A [`RunContext`] is passed explicitly into the crawl and catalog entry
//! points. It carries a cooperative cancellation flag, polled at fixed points
//! (before each fetch, each download and each worker dispatch or commit),
//! and an optional channel that progress events are pushed onto.
//!
//! ```
//! use doc_harvester::progress::{Phase, RunContext};
//!
//! let (ctx, mut events) = RunContext::with_events();
//! ctx.report(Phase::Catalog, 1, 10, "file 1");
//! ctx.cancel();
//!
//! assert!(ctx.is_cancelled());
//! let event = events.try_recv().unwrap();
//! assert_eq!(event.current, 1);
//! ```

use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Which half of the pipeline produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Crawl,
    Download,
    Catalog,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Crawl => "crawl",
            Self::Download => "download",
            Self::Catalog => "catalog",
        };
        write!(f, "{}", name)
    }
}

/// One progress update: `(phase, current, total, message)`
///
/// `total` is 0 when the amount of work is not known up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Explicit context for one run of the crawler or catalog processor
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl RunContext {
    /// A context with a fresh cancellation flag and no event consumer
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose progress events go to the returned receiver
    pub fn with_events() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Self {
            cancel: CancellationToken::new(),
            events: Some(tx),
        };
        (ctx, rx)
    }

    /// Shares an existing cancellation token, e.g. one tied to Ctrl-C
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Requests a cooperative stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The underlying token, for `select!` against long awaits
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Publishes a progress event; a closed or missing receiver is ignored
    pub fn report(&self, phase: Phase, current: usize, total: usize, message: impl Into<String>) {
        if let Some(tx) = &self.events {
            let _ = tx.send(ProgressEvent {
                phase,
                current,
                total,
                message: message.into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_cancellation() {
        let ctx = RunContext::new();
        let worker_view = ctx.clone();
        assert!(!worker_view.is_cancelled());

        ctx.cancel();
        assert!(worker_view.is_cancelled());
    }

    #[test]
    fn test_report_without_receiver_is_noop() {
        let ctx = RunContext::new();
        ctx.report(Phase::Crawl, 1, 0, "page");
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (ctx, mut rx) = RunContext::with_events();
        ctx.report(Phase::Crawl, 1, 5, "a");
        ctx.report(Phase::Download, 2, 5, "b");

        assert_eq!(rx.try_recv().unwrap().message, "a");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.phase, Phase::Download);
        assert_eq!(second.total, 5);
    }

    #[test]
    fn test_with_token_links_external_signal() {
        let token = CancellationToken::new();
        let ctx = RunContext::new().with_token(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
