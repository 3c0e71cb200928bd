use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use url::Url;

/// Query parameter carrying the cache token.
pub const TOKEN_PARAM: &str = "t";

/// Issues strictly increasing tokens for image URLs whose content can change
/// while the URL stays the same (mask preview, detection overlay).
///
/// Tokens are the client clock in milliseconds, bumped by one whenever the clock
/// has not advanced past the previous token.
pub struct CacheBuster {
    last: AtomicI64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_token(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Append a fresh token to `url`.
    pub fn bust(&self, url: &str) -> String {
        with_token(url, self.next_token())
    }
}

impl Default for CacheBuster {
    fn default() -> Self {
        Self::new()
    }
}

/// Set the token query parameter on `url`, replacing any previous token.
/// Strings that are not absolute URLs get a plain `?t=` / `&t=` suffix.
pub fn with_token(url: &str, token: i64) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| k != TOKEN_PARAM)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            {
                let mut pairs = parsed.query_pairs_mut();
                pairs.clear();
                for (k, v) in &kept {
                    pairs.append_pair(k, v);
                }
                pairs.append_pair(TOKEN_PARAM, &token.to_string());
            }
            parsed.to_string()
        }
        Err(_) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}={}", url, sep, TOKEN_PARAM, token)
        }
    }
}

/// Read the token back out of a busted URL.
pub fn token_of(url: &str) -> Option<i64> {
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(k, _)| *k == TOKEN_PARAM)
        .filter_map(|(_, v)| v.parse().ok())
        .last()
}
