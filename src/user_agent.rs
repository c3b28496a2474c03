//! Browser identity pool shared by page, image and rendering requests.
//!
//! A fixed set of desktop browser User-Agent strings. One is picked at random
//! per request so that consecutive requests do not all carry the same
//! identity. The pool is immutable after construction and cheap to share
//! behind an `Arc`.

use rand::seq::SliceRandom;

/// Browser User-Agent strings used when no custom pool is configured.
pub const DEFAULT_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.45 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:94.0) Gecko/20100101 Firefox/94.0",
];

/// Immutable list of browser identities.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    agents: Vec<String>,
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self {
            agents: DEFAULT_USER_AGENTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl IdentityPool {
    /// Creates a pool from explicit User-Agent strings.
    ///
    /// Blank entries are dropped; an empty result falls back to the defaults
    /// so that [`pick`](Self::pick) always has something to return.
    #[must_use]
    pub fn new<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let agents: Vec<String> = agents
            .into_iter()
            .map(Into::into)
            .map(|agent| agent.trim().to_string())
            .filter(|agent| !agent.is_empty())
            .collect();
        if agents.is_empty() {
            return Self::default();
        }
        Self { agents }
    }

    /// Returns a random identity from the pool.
    #[must_use]
    pub fn pick(&self) -> &str {
        self.agents
            .choose(&mut rand::thread_rng())
            .map_or(DEFAULT_USER_AGENTS[0], String::as_str)
    }

    /// Returns all identities in the pool.
    #[must_use]
    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    /// Number of identities in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the pool is empty (never true for a constructed pool).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
