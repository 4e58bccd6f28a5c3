#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::MockServer;
use wl_session::{
    ApiClient, Credential, CredentialStore, MemoryCredentialStore, MemorySnapshotStore,
    SessionConfig, SessionContext, UserProfile,
};

pub const REFRESH: &str = "/api/Users/refresh/";
pub const LOGIN: &str = "/api/Users/login/";
pub const LOGOUT: &str = "/api/Users/logout/";
pub const REGISTER: &str = "/api/Users/register/";
pub const PROFILE: &str = "/api/Users/profile/";
pub const FEED: &str = "/api/Journal/journals/feed/";
pub const MY_JOURNALS: &str = "/api/Journal/journals/my/";

pub struct Harness {
    pub client: ApiClient,
    pub ctx: Arc<SessionContext>,
    pub credentials: MemoryCredentialStore,
    pub snapshots: MemorySnapshotStore,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        Self::with_stores(
            server,
            MemoryCredentialStore::new(),
            MemorySnapshotStore::new(),
        )
    }

    /// Harness whose store already holds `access` / `refresh`
    pub fn signed_in(server: &MockServer, access: &str, refresh: Option<&str>) -> Self {
        let credentials = MemoryCredentialStore::with_credential(Credential::new(
            access,
            refresh.map(str::to_string),
        ));
        Self::with_stores(server, credentials, MemorySnapshotStore::new())
    }

    pub fn with_stores(
        server: &MockServer,
        credentials: MemoryCredentialStore,
        snapshots: MemorySnapshotStore,
    ) -> Self {
        let ctx = Arc::new(SessionContext::new(
            Arc::new(credentials.clone()),
            Arc::new(snapshots.clone()),
        ));
        let config = SessionConfig::for_base_url(&server.uri()).unwrap();
        let client = ApiClient::new(config, Arc::clone(&ctx)).unwrap();
        Self {
            client,
            ctx,
            credentials,
            snapshots,
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.credentials.access_token()
    }
}

pub fn profile_json(id: i64, blocked: bool) -> Value {
    json!({
        "id": id,
        "email": "ana@example.com",
        "full_name": "Ana Lima",
        "is_blocked": blocked,
        "is_staff": false,
        "is_verified": true,
        "followers_count": 3
    })
}

pub fn profile(id: i64) -> UserProfile {
    serde_json::from_value(profile_json(id, false)).unwrap()
}
