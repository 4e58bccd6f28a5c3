//! Typed calls for the journal and social endpoints.
//!
//! Everything here goes through [`ApiClient::send`], so each call shares the
//! 401 recovery of the session layer.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::dispatcher::ApiClient;
use crate::errors::Result;
use crate::models::{
    FollowStatus, Journal, JournalEdit, JournalLink, MediaFile, MessageResponse, NewAccount,
    NewJournal, Page, ProfileUpdate, PublicProfile, UserProfile,
};
use crate::request::{ApiRequest, UploadPart};

mod paths {
    pub const FEED: &str = "/api/Journal/journals/feed/";
    pub const EXPLORE: &str = "/api/Journal/journals/explore/";
    pub const MY_JOURNALS: &str = "/api/Journal/journals/my/";
    pub const LIKES: &str = "/api/Journal/likes/";
    pub const COMMENTS: &str = "/api/Journal/comments/";
    pub const SHARES: &str = "/api/Journal/shared-journals/";
    pub const FOLLOW: &str = "/api/Users/follow/";
    pub const FOLLOW_STATUS: &str = "/api/Users/follow/status/";
    pub const FOLLOWERS: &str = "/api/Users/followers/";
    pub const FOLLOWING: &str = "/api/Users/following/";
    pub const SUGGESTIONS: &str = "/api/Users/suggestions/";
    pub const EDIT_PROFILE: &str = "/api/Users/edit-profile/";
    pub const ADMIN_USERS: &str = "/api/Users/admin/users/";
}

#[derive(Serialize)]
struct JournalRef {
    journal: i64,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    journal: i64,
    content: &'a str,
}

#[derive(Serialize)]
struct FollowBody {
    followed: i64,
}

fn journal_form(title: &str, content: &str, media: &[MediaFile]) -> Vec<UploadPart> {
    let mut parts = vec![
        UploadPart::Text {
            name: "title".to_string(),
            value: title.to_string(),
        },
        UploadPart::Text {
            name: "content".to_string(),
            value: content.to_string(),
        },
    ];
    parts.extend(media.iter().map(|media| UploadPart::File {
        name: "media_files".to_string(),
        file_name: media.file_name.clone(),
        mime: media.mime.clone(),
        bytes: media.bytes.clone(),
    }));
    parts
}

/// `followers/` for the signed-in user, `followers/{id}/` for anyone else
fn user_list_path(base: &str, user_id: Option<i64>) -> String {
    match user_id {
        Some(id) => format!("{base}{id}/"),
        None => base.to_string(),
    }
}

impl ApiClient {
    /// Profile of the signed-in user, fetched fresh from the server
    pub async fn profile(&self) -> Result<UserProfile> {
        self.get_json(&self.config().paths.profile).await
    }

    /// Change profile fields and refresh the cached profile with the answer
    #[instrument(skip(self, update))]
    pub async fn edit_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        let user: UserProfile = self.put_json(paths::EDIT_PROFILE, update).await?;
        self.context().cache().adopt(user.clone());
        Ok(user)
    }

    pub async fn public_profile(&self, user_id: i64) -> Result<PublicProfile> {
        self.get_json(&format!("/api/Users/profile/{user_id}/"))
            .await
    }

    pub async fn feed(&self) -> Result<Vec<Journal>> {
        self.get_json(paths::FEED).await
    }

    pub async fn explore(&self) -> Result<Vec<Journal>> {
        self.get_json(paths::EXPLORE).await
    }

    pub async fn my_journals(&self) -> Result<Vec<Journal>> {
        self.get_json(paths::MY_JOURNALS).await
    }

    /// Upload a journal with its media as one multipart form
    #[instrument(skip(self, journal), fields(title = %journal.title, media = journal.media.len()))]
    pub async fn create_journal(&self, journal: &NewJournal) -> Result<Journal> {
        let parts = journal_form(&journal.title, &journal.content, &journal.media);
        let response = self
            .send(ApiRequest::post(paths::MY_JOURNALS).multipart(parts))
            .await?;
        Ok(response.json().await?)
    }

    /// Replace title and content, add media and drop the listed media ids
    #[instrument(skip(self, edit), fields(media = edit.media.len(), dropped = edit.delete_media_ids.len()))]
    pub async fn update_journal(&self, journal_id: i64, edit: &JournalEdit) -> Result<Journal> {
        let mut parts = journal_form(&edit.title, &edit.content, &edit.media);
        parts.extend(edit.delete_media_ids.iter().map(|id| UploadPart::Text {
            name: "delete_media_ids".to_string(),
            value: id.to_string(),
        }));

        let response = self
            .send(
                ApiRequest::put(format!("{}{journal_id}/", paths::MY_JOURNALS)).multipart(parts),
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn delete_journal(&self, journal_id: i64) -> Result<()> {
        self.delete(&format!("{}{journal_id}/", paths::MY_JOURNALS))
            .await
    }

    /// Like a journal. Keep the returned record's id to unlike it.
    pub async fn like(&self, journal_id: i64) -> Result<JournalLink> {
        self.post_json(
            paths::LIKES,
            &JournalRef {
                journal: journal_id,
            },
        )
        .await
    }

    pub async fn unlike(&self, like_id: i64) -> Result<()> {
        self.delete(&format!("{}{like_id}/", paths::LIKES)).await
    }

    pub async fn comment(&self, journal_id: i64, content: &str) -> Result<()> {
        self.send(ApiRequest::post(paths::COMMENTS).json(&CommentBody {
            journal: journal_id,
            content,
        })?)
        .await?;
        Ok(())
    }

    /// Share a journal to the signed-in user's profile
    pub async fn share(&self, journal_id: i64) -> Result<JournalLink> {
        self.post_json(
            paths::SHARES,
            &JournalRef {
                journal: journal_id,
            },
        )
        .await
    }

    /// Shares made by the signed-in user
    pub async fn my_shares(&self) -> Result<Vec<JournalLink>> {
        self.get_json(paths::SHARES).await
    }

    pub async fn unshare(&self, share_id: i64) -> Result<()> {
        self.delete(&format!("{}{share_id}/", paths::SHARES)).await
    }

    pub async fn follow(&self, user_id: i64) -> Result<()> {
        self.send(ApiRequest::post(paths::FOLLOW).json(&FollowBody { followed: user_id })?)
            .await?;
        Ok(())
    }

    pub async fn unfollow(&self, user_id: i64) -> Result<()> {
        self.delete(&format!("{}{user_id}/", paths::FOLLOW)).await
    }

    pub async fn is_following(&self, user_id: i64) -> Result<bool> {
        let response = self
            .send(ApiRequest::get(paths::FOLLOW_STATUS).query("followed", user_id.to_string()))
            .await?;
        let status: FollowStatus = response.json().await?;
        Ok(status.is_following)
    }

    /// First page of followers, of `user_id` or of the signed-in user
    pub async fn followers(&self, user_id: Option<i64>) -> Result<Vec<UserProfile>> {
        let page: Page<UserProfile> = self
            .get_json(&user_list_path(paths::FOLLOWERS, user_id))
            .await?;
        Ok(page.results)
    }

    /// First page of followed users, of `user_id` or of the signed-in user
    pub async fn following(&self, user_id: Option<i64>) -> Result<Vec<UserProfile>> {
        let page: Page<UserProfile> = self
            .get_json(&user_list_path(paths::FOLLOWING, user_id))
            .await?;
        Ok(page.results)
    }

    /// First page of accounts the signed-in user does not follow yet
    pub async fn suggestions(&self) -> Result<Vec<UserProfile>> {
        let page: Page<UserProfile> = self.get_json(paths::SUGGESTIONS).await?;
        Ok(page.results)
    }

    /// All accounts, staff only
    pub async fn admin_users(&self) -> Result<Vec<UserProfile>> {
        self.get_json(paths::ADMIN_USERS).await
    }

    /// Create an account that skips email verification, staff only
    #[instrument(skip(self, account), fields(email = %account.email))]
    pub async fn admin_create_user(&self, account: &NewAccount) -> Result<UserProfile> {
        self.post_json(paths::ADMIN_USERS, account).await
    }

    /// Overwrite fields of an account, staff only
    #[instrument(skip(self, fields))]
    pub async fn admin_update_user(
        &self,
        user_id: i64,
        fields: &Map<String, Value>,
    ) -> Result<UserProfile> {
        self.put_json(&format!("{}{user_id}/", paths::ADMIN_USERS), fields)
            .await
    }

    #[instrument(skip(self))]
    pub async fn admin_delete_user(&self, user_id: i64) -> Result<()> {
        self.delete(&format!("{}{user_id}/", paths::ADMIN_USERS))
            .await
    }

    /// Toggle the blocked flag of an account. Returns the server's message.
    #[instrument(skip(self))]
    pub async fn admin_toggle_block(&self, user_id: i64) -> Result<String> {
        let response = self
            .send(ApiRequest::post(format!(
                "{}{user_id}/block/",
                paths::ADMIN_USERS
            )))
            .await?;
        let body: MessageResponse = response.json().await?;
        Ok(body.message)
    }
}
