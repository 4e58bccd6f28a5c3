use std::sync::Arc;

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::config::SessionConfig;
use crate::context::{Generation, SessionContext, TeardownReason};
use crate::errors::{FatalSession, Result, SessionError};
use crate::models::{RefreshRequest, RefreshResponse};
use crate::refresh::{Admission, RefreshCoordinator, RefreshOutcome, Renewed, SettleGuard};
use crate::request::ApiRequest;

/// HTTP client for the travel journal API.
///
/// Every call carries the current access token. A call rejected with 401 is
/// recovered through a single shared refresh and replayed once; callers only
/// see the error if the session itself cannot be recovered.
///
/// Clone is cheap, all clones share the connection pool and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) config: SessionConfig,
    http: Client,
    pub(crate) ctx: Arc<SessionContext>,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(config: SessionConfig, ctx: Arc<SessionContext>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("wanderlog"))
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                ctx,
                refresh: RefreshCoordinator::new(),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.inner.ctx
    }

    /// Whether a token refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.is_refreshing()
    }

    /// Send an authenticated request, recovering from an expired access token
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: ApiRequest) -> Result<Response> {
        let sent_with = self.inner.ctx.credentials().access_token();
        match self.inner.dispatch(&request, sent_with.as_deref()).await {
            Err(SessionError::Unauthorized) => self.recover(request, sent_with).await,
            other => other,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(ApiRequest::get(path)).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(ApiRequest::post(path).json(body)?).await?;
        Ok(response.json().await?)
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(ApiRequest::put(path).json(body)?).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }

    /// Ride the shared refresh, then replay the request exactly once
    async fn recover(&self, request: ApiRequest, sent_with: Option<String>) -> Result<Response> {
        let ctx = &self.inner.ctx;
        let admission = self.inner.refresh.admit(sent_with.as_deref(), || {
            let (credential, generation) = ctx.credential_with_generation();
            (credential.map(|c| c.access_token), generation)
        });

        let renewed = match admission {
            Admission::Current(renewed) => {
                debug!("Access token was replaced in flight, retrying with the current one");
                renewed
            }
            Admission::Lead(waiter, generation) => {
                debug!("Access token rejected, starting refresh");
                tokio::spawn(ClientInner::run_refresh(Arc::clone(&self.inner), generation));
                Self::await_outcome(waiter.await)?
            }
            Admission::Wait(waiter) => {
                debug!("Access token rejected, waiting for the refresh in flight");
                Self::await_outcome(waiter.await)?
            }
            Admission::Ended => return Err(FatalSession::TornDown.into()),
            Admission::SignedOut => return Err(FatalSession::MissingRefreshToken.into()),
        };

        match self
            .inner
            .dispatch(&request, Some(&renewed.access_token))
            .await
        {
            Err(SessionError::Unauthorized) => {
                warn!("Request rejected again after refresh");
                ctx.teardown_episode(
                    renewed.generation,
                    TeardownReason::SessionExpired(FatalSession::RetryRejected),
                );
                Err(FatalSession::RetryRejected.into())
            }
            other => other,
        }
    }

    fn await_outcome(
        received: std::result::Result<RefreshOutcome, tokio::sync::oneshot::error::RecvError>,
    ) -> Result<Renewed> {
        match received {
            Ok(Ok(renewed)) => Ok(renewed),
            Ok(Err(fatal)) => Err(fatal.into()),
            Err(_) => Err(FatalSession::Abandoned.into()),
        }
    }
}

impl ClientInner {
    /// One attempt, no recovery
    pub(crate) async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<Response> {
        let response = self.send_raw(request, access_token).await?;
        classify(response).await
    }

    /// One attempt, response returned whatever its status
    pub(crate) async fn send_raw(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<Response> {
        let url = self.config.url_for(&request.path)?;
        Ok(request
            .build(&self.http, url, access_token)?
            .send()
            .await?)
    }

    /// The single refresh of an episode. Runs detached from the request that
    /// triggered it, so a cancelled caller cannot strand the waiters.
    ///
    /// `generation` is the session the episode was admitted for. If that
    /// session ended or was replaced before the task ran, nothing is sent.
    async fn run_refresh(self: Arc<Self>, generation: Generation) {
        let guard = SettleGuard::new(&self.refresh);
        let (credential, current) = self.ctx.credential_with_generation();

        let refreshed = if current != generation {
            Err(FatalSession::TornDown)
        } else {
            match credential.and_then(|c| c.refresh_token) {
                Some(refresh_token) => self.request_access_token(&refresh_token).await,
                None => Err(FatalSession::MissingRefreshToken),
            }
        };

        let outcome = match refreshed {
            Ok(access_token) => {
                if self.ctx.replace_access_token(generation, &access_token) {
                    Ok(Renewed {
                        access_token,
                        generation,
                    })
                } else {
                    Err(FatalSession::TornDown)
                }
            }
            Err(fatal) => {
                warn!("Token refresh failed: {}", fatal);
                if self
                    .ctx
                    .teardown_episode(generation, TeardownReason::SessionExpired(fatal.clone()))
                {
                    Err(fatal)
                } else {
                    // Torn down or replaced by a sign-in while refreshing
                    Err(FatalSession::TornDown)
                }
            }
        };

        let woken = guard.settle(outcome);
        debug!(woken, "Token refresh settled");
    }

    /// `POST {refresh}` for a new access token. Never carries the access token.
    #[instrument(skip(self, refresh_token))]
    async fn request_access_token(&self, refresh_token: &str) -> std::result::Result<String, FatalSession> {
        let url = self
            .config
            .url_for(&self.config.paths.refresh)
            .map_err(|e| FatalSession::Transport(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await
            .map_err(|e| FatalSession::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FatalSession::RefreshRejected(status));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| FatalSession::MalformedRefresh(e.to_string()))?;
        debug!("Access token refreshed");
        Ok(body.access)
    }
}

/// Map a response to success, the 401 recovery trigger, or a pass-through error
pub(crate) async fn classify(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(SessionError::Unauthorized);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    let err = SessionError::http(status, &body);
    if status == StatusCode::BAD_REQUEST {
        warn!(url = %url, "Bad request: {}", err);
    }
    Err(err)
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url.as_str())
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}
