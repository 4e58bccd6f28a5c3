use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Result;

/// Default endpoint paths of the travel journal API
pub mod endpoints {
    pub const REFRESH: &str = "/api/Users/refresh/";
    pub const LOGIN: &str = "/api/Users/login/";
    pub const LOGOUT: &str = "/api/Users/logout/";
    pub const REGISTER: &str = "/api/Users/register/";
    pub const PROFILE: &str = "/api/Users/profile/";
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Quiet period after which the idle monitor tears the session down
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Client-side retention of a stored credential, independent of server validity
pub const DEFAULT_CREDENTIAL_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Paths of the account endpoints, relative to the base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
    pub refresh: String,
    pub login: String,
    pub logout: String,
    pub register: String,
    pub profile: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            refresh: endpoints::REFRESH.to_string(),
            login: endpoints::LOGIN.to_string(),
            logout: endpoints::LOGOUT.to_string(),
            register: endpoints::REGISTER.to_string(),
            profile: endpoints::PROFILE.to_string(),
        }
    }
}

/// Configuration for the session stack
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root of the REST API
    pub base_url: Url,

    pub paths: EndpointPaths,

    /// Idle monitor quiet period
    pub idle_timeout: Duration,

    /// How long a persisted credential is kept on the client
    pub credential_retention: Duration,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,
}

impl SessionConfig {
    /// Config with defaults pointing at `base_url`
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            paths: EndpointPaths::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            credential_retention: DEFAULT_CREDENTIAL_RETENTION,
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("wanderlog".to_string()),
        }
    }

    /// Parse `base_url` and build a config around it
    pub fn for_base_url(base_url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.paths.refresh = path.into();
        self
    }

    /// Resolve an API path against the base URL.
    ///
    /// Paths are joined onto the base URL's own path, so a base of
    /// `https://host/travel` and a path of `/api/x/` yields `https://host/travel/api/x/`.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        Ok(base.join(path.trim_start_matches('/'))?)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Url::parse(DEFAULT_BASE_URL).expect("valid default base URL"))
    }
}
