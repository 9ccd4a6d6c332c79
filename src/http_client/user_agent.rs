//! User agent selection for the transport.

/// Desktop browser string sent by default. Douban serves its full pages to it.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/93.0.4577.63 Safari/537.36 Edg/93.0.961.44";

/// Real browser user agents for impersonate mode.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// One of [`IMPERSONATE_USER_AGENTS`], chosen by the clock.
pub fn random_user_agent() -> &'static str {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as usize)
        .unwrap_or_default();
    IMPERSONATE_USER_AGENTS[seed % IMPERSONATE_USER_AGENTS.len()]
}

/// User agent for the `http.user_agent` setting: unset sends [`USER_AGENT`],
/// `impersonate` (any case) picks a browser string, anything else is sent
/// verbatim.
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config.map(str::trim).filter(|ua| !ua.is_empty()) {
        None => USER_AGENT.to_string(),
        Some(ua) if ua.eq_ignore_ascii_case("impersonate") => random_user_agent().to_string(),
        Some(ua) => ua.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        assert_eq!(resolve_user_agent(None), USER_AGENT);
        assert_eq!(resolve_user_agent(Some("  ")), USER_AGENT);
    }

    #[test]
    fn test_resolve_user_agent_impersonate() {
        let ua = resolve_user_agent(Some("Impersonate"));
        assert!(IMPERSONATE_USER_AGENTS.contains(&ua.as_str()));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
    }
}
