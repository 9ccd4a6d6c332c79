//! Cookie-backed session for the Douban origin.
//!
//! The operator supplies cookies as one string (`k1=v1; k2=v2`). The store
//! applies that string to the shared cookie jar and re-applies it only when
//! the string changes, so it can be called before every request.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use reqwest::cookie::{CookieStore, Jar};
use tracing::{debug, info, warn};
use url::Url;

const EXPIRED: &str = "Expires=Thu, 01 Jan 1970 00:00:00 GMT";

#[derive(Debug, Default)]
struct Applied {
    raw: String,
    names: Vec<String>,
    generation: u64,
}

/// Owns the configured-cookie view of a shared [`Jar`].
#[derive(Debug)]
pub struct SessionStore {
    jar: Arc<Jar>,
    cookie_url: Url,
    cookie_domain: Option<String>,
    applied: RwLock<Applied>,
}

impl SessionStore {
    /// `cookie_domain` of `None` makes configured cookies host-only for `cookie_url`.
    pub fn new(jar: Arc<Jar>, cookie_url: Url, cookie_domain: Option<String>) -> Self {
        Self {
            jar,
            cookie_url,
            cookie_domain: cookie_domain.filter(|d| !d.trim().is_empty()),
            applied: RwLock::new(Applied::default()),
        }
    }

    /// The jar the transport should read and write cookies through.
    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    /// Number of reloads performed so far.
    pub fn generation(&self) -> u64 {
        match self.applied.read() {
            Ok(applied) => applied.generation,
            Err(poisoned) => poisoned.into_inner().generation,
        }
    }

    /// Make the jar reflect `raw`. Returns whether a reload happened.
    pub fn ensure_loaded(&self, raw: &str) -> bool {
        let raw = raw.trim();

        if let Ok(applied) = self.applied.read() {
            if applied.raw == raw {
                return false;
            }
        }

        let mut applied = match self.applied.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Another caller may have reloaded while we waited for the lock.
        if applied.raw == raw {
            return false;
        }

        self.expire_all(&applied.names);

        let mut names = Vec::new();
        for (key, value) in parse_cookie_config(raw) {
            self.jar
                .add_cookie_str(&self.cookie_line(&key, &value), &self.cookie_url);
            names.push(key);
        }

        applied.raw = raw.to_string();
        applied.names = names;
        applied.generation += 1;

        info!(
            "Loaded {} session cookie(s) for {}",
            applied.names.len(),
            self.cookie_url
        );
        true
    }

    /// Expire every cookie visible at the governing URL plus the ones we set.
    fn expire_all(&self, previously_applied: &[String]) {
        let mut names: BTreeSet<String> = previously_applied.iter().cloned().collect();
        if let Some(header) = self.jar.cookies(&self.cookie_url) {
            if let Ok(header) = header.to_str() {
                for pair in header.split(';') {
                    if let Some((name, _)) = pair.split_once('=') {
                        names.insert(name.trim().to_string());
                    }
                }
            }
        }

        for name in &names {
            let line = format!("{}; {}", self.cookie_line(name, ""), EXPIRED);
            self.jar.add_cookie_str(&line, &self.cookie_url);
        }
        if !names.is_empty() {
            debug!("Expired {} cookie(s) for {}", names.len(), self.cookie_url);
        }
    }

    fn cookie_line(&self, key: &str, value: &str) -> String {
        match &self.cookie_domain {
            Some(domain) => format!("{}={}; Path=/; Domain={}", key, value, domain),
            None => format!("{}={}; Path=/", key, value),
        }
    }
}

/// Split `k1=v1; k2=v2` into pairs. Segments that do not split into exactly
/// one key and one value are logged and skipped.
pub fn parse_cookie_config(raw: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for segment in raw.split(';') {
        if segment.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = segment.split('=').collect();
        let key = parts[0].trim();
        if parts.len() != 2 || key.is_empty() {
            warn!("Skipping malformed cookie entry: {:?}", segment.trim());
            continue;
        }

        pairs.push((key.to_string(), parts[1].trim().to_string()));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(
            Arc::new(Jar::default()),
            Url::parse("https://douban.com/").unwrap(),
            Some(".douban.com".to_string()),
        )
    }

    fn cookies_at(store: &SessionStore, url: &str) -> BTreeSet<String> {
        store
            .jar()
            .cookies(&Url::parse(url).unwrap())
            .map(|h| {
                h.to_str()
                    .unwrap()
                    .split(';')
                    .map(|s| s.trim().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_parse_skips_malformed() {
        let pairs = parse_cookie_config(" bid=abc; broken; a=b=c; =x; ll=\"108288\"; ");
        assert_eq!(
            pairs,
            vec![
                ("bid".to_string(), "abc".to_string()),
                ("ll".to_string(), "\"108288\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_unchanged_config_loads_once() {
        let store = store();
        assert!(store.ensure_loaded("bid=abc"));
        assert!(!store.ensure_loaded("bid=abc"));
        assert!(!store.ensure_loaded("  bid=abc "));
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_cookies_apply_to_subdomains() {
        let store = store();
        store.ensure_loaded("bid=abc; dbcl2=xyz");

        let cookies = cookies_at(&store, "https://movie.douban.com/subject/1/");
        assert!(cookies.contains("bid=abc"));
        assert!(cookies.contains("dbcl2=xyz"));
        assert!(cookies_at(&store, "https://example.com/").is_empty());
    }

    #[test]
    fn test_changed_config_replaces_previous_cookies() {
        let store = store();
        store.ensure_loaded("bid=abc; dbcl2=xyz");
        assert!(store.ensure_loaded("bid=new"));
        assert_eq!(store.generation(), 2);

        let cookies = cookies_at(&store, "https://movie.douban.com/");
        assert_eq!(cookies, BTreeSet::from(["bid=new".to_string()]));
    }

    #[test]
    fn test_clearing_config_expires_everything() {
        let store = store();
        store.ensure_loaded("bid=abc");
        assert!(store.ensure_loaded(""));
        assert!(cookies_at(&store, "https://movie.douban.com/").is_empty());
    }

    #[test]
    fn test_concurrent_loads_reload_once() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.ensure_loaded("bid=abc"))
            })
            .collect();

        let reloads = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|reloaded| *reloaded)
            .count();

        assert_eq!(reloads, 1);
        assert_eq!(store.generation(), 1);
    }
}
