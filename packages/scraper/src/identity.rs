//! Request identity rotation.
//!
//! Each row of a crawl is its own browsing session. [`IdentityPolicy`] picks
//! a user agent (plus headers) for a session at random from a pool and, in
//! sticky mode, keeps handing out the same identity for that session so a
//! paginated walk looks like one visitor clicking through pages.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use listcrawl_crawl_models::Identity;
use rand::seq::SliceRandom as _;

/// `Accept-Language` sent when the configured headers do not set one.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Built-in user agent pool: current desktop and mobile browsers.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36 Edg/140.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:143.0) Gecko/20100101 Firefox/143.0",
    "Mozilla/5.0 (iPad; CPU OS 18_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/135.0.7049.83 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 18_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/136.0.7103.91 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 15; SM-S931B Build/AP3A.240905.015.A2; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/132.0.6834.163 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; SM-S928B/DS) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.230 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; SM-F9560 Build/UP1A.231005.007; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/127.0.6533.103 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; Pixel 9 Build/AD1A.240411.003.A5; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/124.0.6367.54 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-S911B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/104.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SAMSUNG SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/21.0 Chrome/110.0.5481.154 Mobile Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.3.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:141.0) Gecko/20100101 Firefox/141.0",
];

/// Chooses the identity each outbound request is sent under.
#[derive(Debug)]
pub struct IdentityPolicy {
    pool: Vec<Arc<Identity>>,
    sticky: bool,
    /// Session key to identity, filled lazily in sticky mode.
    bindings: Mutex<BTreeMap<u64, Arc<Identity>>>,
}

impl IdentityPolicy {
    /// Creates a policy over an explicit identity pool.
    #[must_use]
    pub fn new(pool: Vec<Identity>, sticky: bool) -> Self {
        Self {
            pool: pool.into_iter().map(Arc::new).collect(),
            sticky,
            bindings: Mutex::new(BTreeMap::new()),
        }
    }

    /// Creates a policy with one identity per user agent, each carrying
    /// `headers`. `Accept-Language` defaults to [`DEFAULT_ACCEPT_LANGUAGE`].
    #[must_use]
    pub fn from_user_agents<S: AsRef<str>>(
        user_agents: &[S],
        headers: &BTreeMap<String, String>,
        sticky: bool,
    ) -> Self {
        let mut headers = headers.clone();
        if !headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("accept-language"))
        {
            headers.insert(
                "Accept-Language".to_owned(),
                DEFAULT_ACCEPT_LANGUAGE.to_owned(),
            );
        }

        let pool = user_agents
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|ua| !ua.trim().is_empty())
            .map(|ua| Identity {
                user_agent: ua.to_owned(),
                headers: headers.clone(),
            })
            .collect();

        Self::new(pool, sticky)
    }

    /// Returns the identity for `session_key`, or `None` if the pool is empty
    /// (the transport's own default applies).
    #[must_use]
    pub fn identity_for(&self, session_key: u64) -> Option<Arc<Identity>> {
        if self.pool.is_empty() {
            return None;
        }

        if !self.sticky {
            return self.draw();
        }

        let mut bindings = self
            .bindings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(identity) = bindings.get(&session_key) {
            return Some(Arc::clone(identity));
        }
        let identity = self.draw()?;
        bindings.insert(session_key, Arc::clone(&identity));
        drop(bindings);
        Some(identity)
    }

    /// Whether identities stay bound to their session.
    #[must_use]
    pub const fn is_sticky(&self) -> bool {
        self.sticky
    }

    /// Number of identities in the pool.
    #[must_use]
    pub const fn pool_size(&self) -> usize {
        self.pool.len()
    }

    #[cfg(test)]
    fn bound_sessions(&self) -> usize {
        self.bindings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn draw(&self) -> Option<Arc<Identity>> {
        self.pool.choose(&mut rand::thread_rng()).cloned()
    }
}
