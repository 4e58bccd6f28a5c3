use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Login request body
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Token pair issued by login
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
}

/// Registration answer. The server also issues tokens, which are ignored:
/// the account must verify its email before it can sign in.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Plain `{"message": ...}` answer of action endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Refresh request body
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Refresh response. The refresh token is long-lived and is not reissued.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// Error body returned by the account endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiErrorBody {
    pub fn message(&self) -> Option<&str> {
        self.error.as_deref().or(self.detail.as_deref())
    }
}

/// Account registration form
#[derive(Debug, Clone, Serialize, Default)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// Profile of the authenticated user.
///
/// Only the fields the session layer looks at are typed; everything else the
/// server sends is kept in `extra` and written back untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }
}

/// A journal entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Journal {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// A like or share record linking the signed-in user to a journal.
///
/// Its `id`, not the journal's, is what unlike and unshare take.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JournalLink {
    pub id: i64,
    pub journal: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Media file attached to a new journal
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// A journal to be created
#[derive(Debug, Clone, Default)]
pub struct NewJournal {
    pub title: String,
    pub content: String,
    pub media: Vec<MediaFile>,
}

/// Changes to an existing journal
#[derive(Debug, Clone, Default)]
pub struct JournalEdit {
    pub title: String,
    pub content: String,
    /// Media to add
    pub media: Vec<MediaFile>,
    /// Ids of attached media to remove
    pub delete_media_ids: Vec<i64>,
}

/// Profile fields to change. The server checks `current_password` first.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ProfileUpdate {
    pub current_password: String,
    #[serde(flatten)]
    pub changes: Map<String, Value>,
}

/// Follow status of another user
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FollowStatus {
    pub is_following: bool,
}

/// Profile of another user, with their journals
#[derive(Debug, Clone, Deserialize)]
pub struct PublicProfile {
    pub user: UserProfile,
    #[serde(default)]
    pub journals: Vec<Journal>,
}
