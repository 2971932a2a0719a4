// crates/core/src/context.rs
//! Agent identity and endpoints, built once at the process boundary.
//!
//! Cookie access is confined to [`CookieJar`]; everything downstream takes an
//! [`AgentContext`].

use helpdesk_types::Id;

use crate::error::ContextError;

pub const LOGGED_IN_COOKIE: &str = "isLoggedIn";
pub const AGENT_ID_COOKIE: &str = "id";
pub const TOKEN_COOKIE: &str = "userToken";
pub const USER_DATA_COOKIE: &str = "userData";

/// Base URLs the console talks to. Each ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api_base_url: String,
    pub media_base_url: String,
    pub socket_url: String,
}

impl Endpoints {
    pub fn new(
        api_base_url: impl Into<String>,
        media_base_url: impl Into<String>,
        socket_url: impl Into<String>,
    ) -> Self {
        Self {
            api_base_url: with_trailing_slash(api_base_url.into()),
            media_base_url: with_trailing_slash(media_base_url.into()),
            socket_url: socket_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// The logged-in agent plus where to reach the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentContext {
    pub agent_id: Id,
    /// Bearer token for REST calls, when the login issued one.
    pub token: Option<String>,
    pub endpoints: Endpoints,
}

impl AgentContext {
    pub fn new(agent_id: impl Into<Id>, endpoints: Endpoints) -> Self {
        Self {
            agent_id: agent_id.into(),
            token: None,
            endpoints,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build from browser-style cookies. `isLoggedIn` missing or `"false"`
    /// means the session is over; a missing `id` means no agent to act as.
    pub fn from_cookies(jar: &CookieJar, endpoints: Endpoints) -> Result<Self, ContextError> {
        match jar.get(LOGGED_IN_COOKIE) {
            None | Some("") | Some("false") => return Err(ContextError::NotLoggedIn),
            Some(_) => {}
        }
        let agent_id = jar
            .get(AGENT_ID_COOKIE)
            .map(Id::new)
            .filter(|id| !id.is_empty())
            .ok_or(ContextError::MissingAgentId)?;
        let token = jar
            .get(TOKEN_COOKIE)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Ok(Self {
            agent_id,
            token,
            endpoints,
        })
    }
}

/// Ordered `name=value` pairs parsed from a `Cookie:` header style string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    pub fn parse(header: &str) -> Self {
        let entries = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n != name);
    }

    /// Forget the login: what a 401 from the API triggers.
    pub fn clear_auth(&mut self) {
        for name in [LOGGED_IN_COOKIE, TOKEN_COOKIE, USER_DATA_COOKIE] {
            self.remove(name);
        }
    }

    pub fn to_header(&self) -> String {
        self.entries
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints::new("https://api.test", "https://media.test/", "wss://chat.test/")
    }

    #[test]
    fn test_endpoints_normalized() {
        let e = endpoints();
        assert_eq!(e.api_base_url, "https://api.test/");
        assert_eq!(e.media_base_url, "https://media.test/");
        assert_eq!(e.socket_url, "wss://chat.test");
    }

    #[test]
    fn test_context_from_cookies() {
        let jar = CookieJar::parse("isLoggedIn=true; id=7; userToken=abc");
        let ctx = AgentContext::from_cookies(&jar, endpoints()).unwrap();
        assert_eq!(ctx.agent_id, Id::from("7"));
        assert_eq!(ctx.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_logged_out_cookie_rejected() {
        let jar = CookieJar::parse("isLoggedIn=false; id=7");
        assert!(matches!(
            AgentContext::from_cookies(&jar, endpoints()),
            Err(ContextError::NotLoggedIn)
        ));
        let jar = CookieJar::parse("id=7");
        assert!(matches!(
            AgentContext::from_cookies(&jar, endpoints()),
            Err(ContextError::NotLoggedIn)
        ));
    }

    #[test]
    fn test_missing_agent_id_rejected() {
        let jar = CookieJar::parse("isLoggedIn=true; id=");
        assert!(matches!(
            AgentContext::from_cookies(&jar, endpoints()),
            Err(ContextError::MissingAgentId)
        ));
    }

    #[test]
    fn test_clear_auth_keeps_other_cookies() {
        let mut jar = CookieJar::parse("isLoggedIn=true; id=7; userToken=abc; userData={}; theme=dark");
        jar.clear_auth();
        assert_eq!(jar.to_header(), "id=7; theme=dark");
    }
}
