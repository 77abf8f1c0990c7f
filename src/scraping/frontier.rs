//! Set-based URL frontier for one crawl
//!
//! Tracks `visited` and `to_visit` with no ordering guarantee between pages.
//! Invariant: the two sets are disjoint, and a URL moves from `to_visit` to
//! `visited` exactly once. The frontier also counts in-flight page fetches so
//! that a traversal finding `to_visit` empty can tell "wait for links still
//! being discovered" apart from "crawl exhausted".

use std::collections::HashSet;
use url::Url;

/// What a traversal should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextUrl {
    /// Fetch this page; the caller must call `complete` afterwards
    Visit(Url),
    /// Nothing queued yet, but other traversals are still fetching
    Wait,
    /// Nothing queued and nothing in flight (or page limit reached)
    Exhausted,
}

/// Visited / to-visit sets shared by every traversal of one crawl
#[derive(Debug, Default)]
pub struct Frontier {
    visited: HashSet<Url>,
    to_visit: HashSet<Url>,
    in_flight: usize,
    max_pages: Option<usize>,
}

impl Frontier {
    /// Create an empty frontier, optionally capped at `max_pages` visits
    pub fn new(max_pages: Option<usize>) -> Self {
        Self {
            max_pages,
            ..Self::default()
        }
    }

    /// Add seed URLs
    pub fn add_seeds(&mut self, seeds: impl IntoIterator<Item = Url>) {
        for url in seeds {
            self.discover(url);
        }
    }

    /// Add a discovered URL unless it was already visited or queued.
    ///
    /// Returns `true` if the URL was newly queued.
    pub fn discover(&mut self, url: Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let url = super::normalize_url(&url);
        if self.visited.contains(&url) {
            return false;
        }
        self.to_visit.insert(url)
    }

    /// Take an arbitrary queued URL and mark it visited
    pub fn take_next(&mut self) -> NextUrl {
        if self.limit_reached() {
            return self.idle_state();
        }

        let next = self.to_visit.iter().next().cloned();
        match next {
            Some(url) => {
                self.to_visit.remove(&url);
                self.visited.insert(url.clone());
                self.in_flight += 1;
                NextUrl::Visit(url)
            }
            None => self.idle_state(),
        }
    }

    /// Mark one in-flight fetch as finished (successfully or not)
    pub fn complete(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn idle_state(&self) -> NextUrl {
        if self.in_flight > 0 {
            NextUrl::Wait
        } else {
            NextUrl::Exhausted
        }
    }

    fn limit_reached(&self) -> bool {
        self.max_pages
            .map(|max| self.visited.len() >= max)
            .unwrap_or(false)
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(&super::normalize_url(url))
    }

    pub fn visited(&self) -> &HashSet<Url> {
        &self.visited
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn pending_count(&self) -> usize {
        self.to_visit.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// True once nothing is queued and nothing is being fetched
    pub fn is_exhausted(&self) -> bool {
        self.in_flight == 0 && (self.to_visit.is_empty() || self.limit_reached())
    }
}
