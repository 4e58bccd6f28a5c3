use reqwest::StatusCode;
use tracing::{info, instrument, warn};

use crate::context::TeardownReason;
use crate::credential::Credential;
use crate::dispatcher::{ApiClient, classify};
use crate::errors::{Result, SessionError};
use crate::models::{
    ApiErrorBody, LoginRequest, NewAccount, RefreshRequest, RegisterResponse, TokenPairResponse,
    UserProfile,
};
use crate::request::ApiRequest;

/// Result of the startup re-validation
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Authenticated(UserProfile),
    Blocked,
    SignedOut,
}

impl ApiClient {
    /// Sign in and adopt the user's profile.
    ///
    /// A blocked account is reported as [`SessionError::AccountBlocked`],
    /// never as invalid credentials, and leaves nothing stored.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let paths = &self.config().paths;
        let request = ApiRequest::post(&paths.login).json(&LoginRequest { email, password })?;

        let response = self.inner.send_raw(&request, None).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(login_error(status, &body));
        }

        let tokens: TokenPairResponse = response.json().await?;
        self.context()
            .sign_in(Credential::new(tokens.access, Some(tokens.refresh)));

        let user = self.validate_profile().await?;
        info!(user_id = user.id, "Signed in");
        Ok(user)
    }

    /// Create an account. Returns the server's message; nothing is stored.
    #[instrument(skip(self, account), fields(email = %account.email))]
    pub async fn register(&self, account: &NewAccount) -> Result<String> {
        let request = ApiRequest::post(&self.config().paths.register).json(account)?;
        let response = classify(self.inner.send_raw(&request, None).await?).await?;
        let body: RegisterResponse = response.json().await?;
        Ok(body
            .message
            .unwrap_or_else(|| "Check your email to verify your account.".to_string()))
    }

    /// Invalidate the refresh token server-side, then tear the session down.
    ///
    /// The local teardown happens even if the server call fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let ctx = self.context();
        if let Some(credential) = ctx.credentials().get()
            && let Some(refresh) = credential.refresh_token.as_deref()
        {
            let request =
                ApiRequest::post(&self.config().paths.logout).json(&RefreshRequest { refresh })?;
            if let Err(e) = self
                .inner
                .dispatch(&request, Some(&credential.access_token))
                .await
            {
                warn!("Server-side logout failed: {}", e);
            }
        }

        ctx.teardown(TeardownReason::LoggedOut);
        Ok(())
    }

    /// Startup re-validation of a persisted session.
    ///
    /// Restores the last snapshot, then trusts it only if a credential is
    /// stored and the server still returns an unblocked profile for it.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> Result<RestoreOutcome> {
        let ctx = self.context();
        ctx.cache().rehydrate();

        if ctx.credentials().get().is_none() {
            ctx.cache().clear();
            return Ok(RestoreOutcome::SignedOut);
        }

        match self.validate_profile().await {
            Ok(user) => Ok(RestoreOutcome::Authenticated(user)),
            Err(SessionError::AccountBlocked) => Ok(RestoreOutcome::Blocked),
            Err(e) => {
                warn!("Could not re-validate stored session: {}", e);
                Ok(RestoreOutcome::SignedOut)
            }
        }
    }

    /// Fetch the profile for the stored credential and adopt it.
    ///
    /// Any failure clears the session; a blocked profile clears it even
    /// though the fetch itself succeeded.
    async fn validate_profile(&self) -> Result<UserProfile> {
        let ctx = self.context();
        let generation = ctx.generation();

        let user: UserProfile = match self.get_json(&self.config().paths.profile).await {
            Ok(user) => user,
            Err(e) => {
                ctx.teardown_episode(generation, TeardownReason::ProfileUnavailable);
                return Err(e);
            }
        };

        if user.is_blocked {
            warn!(user_id = user.id, "Account is blocked");
            ctx.teardown_episode(generation, TeardownReason::AccountBlocked);
            return Err(SessionError::AccountBlocked);
        }

        ctx.adopt(user.clone());
        Ok(user)
    }
}

fn login_error(status: StatusCode, body: &str) -> SessionError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message().map(str::to_lowercase))
        .unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED => SessionError::InvalidCredentials,
        StatusCode::FORBIDDEN if message.contains("blocked") => SessionError::AccountBlocked,
        StatusCode::FORBIDDEN if message.contains("verify") => SessionError::EmailNotVerified,
        _ => SessionError::http(status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_errors_are_classified() {
        assert!(matches!(
            login_error(StatusCode::UNAUTHORIZED, r#"{"error": "Invalid credentials"}"#),
            SessionError::InvalidCredentials
        ));
        assert!(matches!(
            login_error(
                StatusCode::FORBIDDEN,
                r#"{"error": "Your account is blocked, contact administrator"}"#
            ),
            SessionError::AccountBlocked
        ));
        assert!(matches!(
            login_error(
                StatusCode::FORBIDDEN,
                r#"{"error": "Please verify your email address first."}"#
            ),
            SessionError::EmailNotVerified
        ));
        assert!(matches!(
            login_error(StatusCode::FORBIDDEN, "not json"),
            SessionError::Http { .. }
        ));
    }
}
