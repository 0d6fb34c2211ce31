//! Breadth-first frontier for one site crawl

use crate::state::VisitState;
use std::collections::{HashMap, VecDeque};
use url::Url;

/// A page waiting to be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedPage {
    pub url: Url,
    /// Link distance from the seed
    pub depth: u32,
}

/// FIFO queue plus the visit state of every URL seen in this run
///
/// A URL is accepted at most once per run, whether it was queued as a page
/// or handled as a file link.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<QueuedPage>,
    states: HashMap<String, VisitState>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a page; returns false if the URL was already seen
    pub fn push(&mut self, url: Url, depth: u32) -> bool {
        if self.is_seen(&url) {
            return false;
        }
        self.states.insert(url.to_string(), VisitState::Queued);
        self.queue.push_back(QueuedPage { url, depth });
        true
    }

    /// Takes the oldest queued page and marks it `visiting`
    ///
    /// Entries already taken over through [`Frontier::adopt`] are dropped.
    pub fn pop(&mut self) -> Option<QueuedPage> {
        while let Some(page) = self.queue.pop_front() {
            if self.state_of(&page.url) == Some(VisitState::Queued) {
                self.states
                    .insert(page.url.to_string(), VisitState::Visiting);
                return Some(page);
            }
        }
        None
    }

    /// Takes over a redirect target reached while visiting another URL
    ///
    /// Returns false if the target was already fetched in this run. A target
    /// still waiting in the queue is marked `visiting` and will not be popped.
    pub fn adopt(&mut self, url: &Url) -> bool {
        match self.state_of(url) {
            None | Some(VisitState::Queued) => {
                self.states.insert(url.to_string(), VisitState::Visiting);
                true
            }
            Some(_) => false,
        }
    }

    /// Claims a non-page URL (a file link) for this run
    ///
    /// Returns false if the URL was already seen.
    pub fn claim(&mut self, url: &Url) -> bool {
        if self.is_seen(url) {
            return false;
        }
        self.states.insert(url.to_string(), VisitState::Visiting);
        true
    }

    /// Records a state transition, ignoring transitions the state machine forbids
    pub fn mark(&mut self, url: &Url, next: VisitState) {
        if let Some(state) = self.states.get_mut(url.as_str()) {
            if state.can_transition_to(next) {
                *state = next;
            } else {
                tracing::debug!("Ignoring transition {} -> {} for {}", state, next, url);
            }
        }
    }

    pub fn is_seen(&self, url: &Url) -> bool {
        self.states.contains_key(url.as_str())
    }

    pub fn state_of(&self, url: &Url) -> Option<VisitState> {
        self.states.get(url.as_str()).copied()
    }

    /// Pages still waiting in the queue
    pub fn len(&self) -> usize {
        self.queue
            .iter()
            .filter(|p| self.state_of(&p.url) == Some(VisitState::Queued))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of URLs that reached `state`
    pub fn count(&self, state: VisitState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }
}
