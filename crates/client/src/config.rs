// crates/client/src/config.rs
use std::time::Duration;

use helpdesk_core::{AgentContext, ContextError, CookieJar, Endpoints};

pub const DEFAULT_API_URL: &str = "https://api.yourapp.com/";
pub const DEFAULT_MEDIA_URL: &str = "https://s3.yourapp.com/";

/// Where the console connects and who it acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// HELPDESK_API_URL.
    pub api_url: String,
    /// HELPDESK_MEDIA_URL; base for `helpdesk-images/` and `helpdesk-audio/`.
    pub media_url: String,
    /// HELPDESK_SOCKET_URL, defaulting to the API URL.
    pub socket_url: String,
    /// HELPDESK_COOKIE, a `Cookie:` header carrying `isLoggedIn`, `id` and
    /// optionally `userToken`.
    pub cookie: String,
    pub handshake_timeout: Duration,
    /// No socket URL was given, so the socket tracks the API URL.
    socket_follows_api: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl ConsoleConfig {
    /// Build from a variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let api_url = get("HELPDESK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let socket_url = get("HELPDESK_SOCKET_URL");
        Self {
            media_url: get("HELPDESK_MEDIA_URL").unwrap_or_else(|| DEFAULT_MEDIA_URL.into()),
            socket_follows_api: socket_url.is_none(),
            socket_url: socket_url.unwrap_or_else(|| api_url.clone()),
            cookie: get("HELPDESK_COOKIE").unwrap_or_default(),
            api_url,
            handshake_timeout: Duration::from_secs(10),
        }
    }

    /// Point at another API. The socket moves along unless a socket URL was
    /// set explicitly.
    pub fn override_api_url(&mut self, url: impl Into<String>) {
        self.api_url = url.into();
        if self.socket_follows_api {
            self.socket_url = self.api_url.clone();
        }
    }

    pub fn override_socket_url(&mut self, url: impl Into<String>) {
        self.socket_url = url.into();
        self.socket_follows_api = false;
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.api_url, &self.media_url, &self.socket_url)
    }

    pub fn cookies(&self) -> CookieJar {
        CookieJar::parse(&self.cookie)
    }

    /// The agent context, read from the configured cookie string.
    pub fn context(&self) -> Result<AgentContext, ContextError> {
        AgentContext::from_cookies(&self.cookies(), self.endpoints())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ConsoleConfig::from_lookup(lookup(&[]));
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.media_url, DEFAULT_MEDIA_URL);
        assert_eq!(config.socket_url, DEFAULT_API_URL);
        assert_eq!(config.cookie, "");
    }

    #[test]
    fn test_socket_url_follows_api_url() {
        let config = ConsoleConfig::from_lookup(lookup(&[
            ("HELPDESK_API_URL", "http://localhost:4000"),
            ("HELPDESK_SOCKET_URL", " "),
        ]));
        assert_eq!(config.socket_url, "http://localhost:4000");
        assert_eq!(config.endpoints().api_base_url, "http://localhost:4000/");
    }

    #[test]
    fn test_api_override_moves_socket_only_when_unset() {
        let mut config = ConsoleConfig::from_lookup(lookup(&[]));
        config.override_api_url("http://localhost:4000");
        assert_eq!(config.socket_url, "http://localhost:4000");

        let mut config = ConsoleConfig::from_lookup(lookup(&[(
            "HELPDESK_SOCKET_URL",
            "wss://chat.test",
        )]));
        config.override_api_url("http://localhost:4000");
        assert_eq!(config.api_url, "http://localhost:4000");
        assert_eq!(config.socket_url, "wss://chat.test");

        let mut config = ConsoleConfig::from_lookup(lookup(&[]));
        config.override_socket_url("ws://localhost:5000");
        config.override_api_url("http://localhost:4000");
        assert_eq!(config.socket_url, "ws://localhost:5000");
    }

    #[test]
    fn test_context_from_cookie() {
        let config = ConsoleConfig::from_lookup(lookup(&[(
            "HELPDESK_COOKIE",
            "isLoggedIn=true; id=7; userToken=t0k",
        )]));
        let ctx = config.context().unwrap();
        assert_eq!(ctx.agent_id.as_str(), "7");
        assert_eq!(ctx.token.as_deref(), Some("t0k"));

        let config = ConsoleConfig::from_lookup(lookup(&[]));
        assert!(matches!(config.context(), Err(ContextError::NotLoggedIn)));
    }
}
