//! Client configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). The WebSocket URL is either given explicitly or derived from
//! the backend API URL and, when the client is embedded in a web page, the
//! page origin.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ClientError;

/// Path of the chat endpoint on the backend.
pub const WS_PATH: &str = "/ws";

/// Backend base URL used when `API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Deployment mode of the hosting application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    /// Frontend and backend on different hosts; the socket targets the API
    /// host.
    Development,
    /// Frontend and backend behind the same origin.
    #[default]
    Production,
}

impl FromStr for AppEnv {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ClientError::Config(format!("unknown APP_ENV `{other}`"))),
        }
    }
}

/// Origin of the web page hosting the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    /// Whether the page was served over `https`.
    pub secure: bool,
    /// Host and optional port, e.g. `dash.example.com:3000`.
    pub host: String,
}

impl FromStr for PageOrigin {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (secure, rest) = if let Some(rest) = s.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix("http://") {
            (false, rest)
        } else {
            return Err(ClientError::Config(format!(
                "page origin `{s}` must start with http:// or https://"
            )));
        };
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(ClientError::Config(format!("page origin `{s}` has no host")));
        }
        Ok(Self {
            secure,
            host: host.to_string(),
        })
    }
}

/// Reconnection behaviour of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnect after an unexpected close.
    pub auto_reconnect: bool,
    /// Fixed delay before each reconnect attempt.
    pub interval: Duration,
    /// Consecutive reconnect attempts allowed before giving up.
    pub max_attempts: u32,
    /// Optional limit on the WebSocket handshake.
    pub connect_timeout: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            interval: Duration::from_millis(5000),
            max_attempts: 5,
            connect_timeout: None,
        }
    }
}

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Explicit WebSocket URL; wins over every derived value.
    pub ws_url: Option<String>,
    /// Backend base URL, e.g. `http://localhost:8080`.
    pub api_url: String,
    /// Origin of the hosting page, if any.
    pub page_origin: Option<PageOrigin>,
    /// Deployment mode.
    pub app_env: AppEnv,
    /// Reconnection behaviour.
    pub reconnect: ReconnectPolicy,
    /// Capacity of the event broadcast channel.
    pub event_bus_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            api_url: DEFAULT_API_URL.to_string(),
            page_origin: None,
            app_env: AppEnv::default(),
            reconnect: ReconnectPolicy::default(),
            event_bus_capacity: 1024,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Numeric values that are missing or invalid fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `PAGE_ORIGIN` or `APP_ENV` is set
    /// but cannot be parsed.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let page_origin = non_empty("PAGE_ORIGIN")
            .map(|v| v.parse::<PageOrigin>())
            .transpose()?;
        let app_env = non_empty("APP_ENV")
            .map(|v| v.parse::<AppEnv>())
            .transpose()?
            .unwrap_or_default();

        let connect_timeout_secs: u64 = parse_value(lookup("WS_CONNECT_TIMEOUT_SECS"), 0);
        let reconnect = ReconnectPolicy {
            auto_reconnect: parse_bool(lookup("WS_AUTO_RECONNECT"), true),
            interval: Duration::from_millis(parse_value(
                lookup("WS_RECONNECT_INTERVAL_MS"),
                5000,
            )),
            max_attempts: parse_value(lookup("WS_MAX_RECONNECT_ATTEMPTS"), 5),
            connect_timeout: (connect_timeout_secs > 0)
                .then(|| Duration::from_secs(connect_timeout_secs)),
        };

        Ok(Self {
            ws_url: non_empty("WS_URL"),
            api_url: non_empty("API_URL").unwrap_or(defaults.api_url),
            page_origin,
            app_env,
            reconnect,
            event_bus_capacity: parse_value(
                lookup("EVENT_BUS_CAPACITY"),
                defaults.event_bus_capacity,
            ),
        })
    }

    /// Returns the WebSocket URL this configuration points at.
    #[must_use]
    pub fn resolved_url(&self) -> String {
        resolve_ws_url(
            self.ws_url.as_deref(),
            self.page_origin.as_ref(),
            &self.api_url,
            self.app_env,
        )
    }
}

/// Resolves the chat WebSocket URL.
///
/// 1. A non-empty `explicit` URL is returned unchanged.
/// 2. Without a page origin the scheme follows the API URL (`https` maps to
///    `wss`) and the host is the API host.
/// 3. With a page origin the scheme follows the page; development mode
///    targets the API host, production the page host.
#[must_use]
pub fn resolve_ws_url(
    explicit: Option<&str>,
    page: Option<&PageOrigin>,
    api_url: &str,
    app_env: AppEnv,
) -> String {
    if let Some(url) = explicit.filter(|u| !u.is_empty()) {
        return url.to_string();
    }

    let api_host = api_host(api_url);
    match page {
        None => {
            let scheme = if api_url.starts_with("https") { "wss" } else { "ws" };
            format!("{scheme}://{api_host}{WS_PATH}")
        }
        Some(origin) => {
            let scheme = if origin.secure { "wss" } else { "ws" };
            let host = match app_env {
                AppEnv::Development => api_host,
                AppEnv::Production => origin.host.as_str(),
            };
            format!("{scheme}://{host}{WS_PATH}")
        }
    }
}

/// Strips the `http(s)://` prefix and any trailing slash from an API URL.
fn api_host(api_url: &str) -> &str {
    api_url
        .strip_prefix("https://")
        .or_else(|| api_url.strip_prefix("http://"))
        .unwrap_or(api_url)
        .trim_end_matches('/')
}

/// Parses an optional raw value as `T`, returning `default` on missing or
/// invalid values.
fn parse_value<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool(raw: Option<String>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}
