//! Request routing: live endpoints versus cache-first assets.

use goldcache_core::ProxyRequest;
use url::Url;

/// Hostname fragments whose requests always go to the network.
///
/// A host matches when it contains any fragment as a substring, so
/// `googleapis.com` also covers `fonts.googleapis.com` and
/// `sheets.googleapis.com`.
#[derive(Debug, Clone, Default)]
pub struct LiveEndpoints {
    fragments: Vec<String>,
}

impl LiveEndpoints {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(|f| f.as_ref().trim().to_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    /// The first fragment contained in the URL's host, if any.
    pub fn matching_fragment(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?.to_lowercase();
        self.fragments
            .iter()
            .find(|fragment| host.contains(fragment.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.matching_fragment(url).is_some()
    }
}

/// How an intercepted request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Network only; never read from or written to the cache.
    Live,
    /// Cache lookup first, network fetch and background refill on miss.
    CacheFirst,
}

pub fn route(live: &LiveEndpoints, request: &ProxyRequest) -> Route {
    if live.matches(&request.url) { Route::Live } else { Route::CacheFirst }
}
