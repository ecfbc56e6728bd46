//! One-time passcode sign-in against a GoTrue-compatible auth server

mod error;
mod session;

pub use error::{AuthError, AuthResult};
pub use session::{Session, SessionStore, SessionUser};

use std::time::Duration;

use chrono::Utc;
use http::{header, StatusCode};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};
use validator::ValidateEmail;

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Maximum number of idle connections to maintain per host
const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 4;
/// Number of digits in an emailed passcode
pub const CODE_LENGTH: usize = 6;

/// Auth collaborator
///
/// Owns the current session and announces every change of it to subscribers.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// Emails a one-time passcode to `email`, creating the member if needed
    async fn request_code(&self, email: &str) -> AuthResult<()>;

    /// Exchanges an emailed passcode for a session
    async fn verify_code(&self, email: &str, code: &str) -> AuthResult<Session>;

    /// Ends the current session, locally even if the server cannot be reached
    async fn sign_out(&self) -> AuthResult<()>;

    /// Returns the current session, refreshing it first if it has expired
    async fn current_session(&self) -> AuthResult<Option<Session>>;

    /// Receiver that observes every session change
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

/// Trims `email` and checks that it looks like an address
///
/// # Errors
///
/// Returns `AuthError::InvalidEmail` for empty or malformed input
pub fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim();
    if !email.validate_email() {
        return Err(AuthError::InvalidEmail(email.to_string()));
    }
    Ok(email.to_string())
}

/// Keeps only the digits of `code`, which must leave exactly six
///
/// # Errors
///
/// Returns `AuthError::InvalidCode` if the passcode does not have six digits
pub fn normalize_code(code: &str) -> AuthResult<String> {
    let digits: String = code.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != CODE_LENGTH {
        return Err(AuthError::InvalidCode);
    }
    Ok(digits)
}

#[derive(Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    email: &'a str,
    token: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: SessionUser,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + token.expires_in.unwrap_or_default());

        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(default, alias = "error_description", alias = "message")]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for a GoTrue-compatible auth server
pub struct GoTrueAuthClient {
    base_url: String,
    api_key: String,
    http_client: ClientWithMiddleware,
    store: SessionStore,
    session: watch::Sender<Option<Session>>,
    refresh_lock: Mutex<()>,
}

impl GoTrueAuthClient {
    /// Creates a client with no session
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Http` if the HTTP client fails to be created
    pub fn new(base_url: &str, api_key: String, store: SessionStore) -> AuthResult<Self> {
        let reqwest_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
            .build()?;

        let http_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        let (session, _) = watch::channel(None);

        info!("Auth client configured for {base_url}");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http_client,
            store,
            session,
            refresh_lock: Mutex::new(()),
        })
    }

    /// Loads the cached session, if any, and announces it
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionStore` if the cache cannot be read
    pub async fn restore(&self) -> AuthResult<Option<Session>> {
        let cached = self.store.load().await?;
        if let Some(session) = &cached {
            debug!("Restored session for user {}", session.user.id);
        }
        self.session.send_replace(cached.clone());
        Ok(cached)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
        bearer: Option<&str>,
    ) -> AuthResult<reqwest::Response> {
        let mut request = self
            .http_client
            .post(self.url(path))
            .header("apikey", &self.api_key)
            .json(body);

        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.json::<ErrorResponse>().await.unwrap_or_default();
        let message = body
            .msg
            .or(body.error)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

        Err(AuthError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn establish(&self, session: Session) -> AuthResult<Session> {
        self.store.save(&session).await?;
        self.session.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn forget(&self) -> AuthResult<()> {
        self.store.clear().await?;
        self.session.send_replace(None);
        Ok(())
    }

    async fn refresh(&self, stale: &Session) -> AuthResult<Option<Session>> {
        let response = self
            .post(
                "/token?grant_type=refresh_token",
                &RefreshRequest {
                    refresh_token: &stale.refresh_token,
                },
                None,
            )
            .await;

        match response {
            Ok(response) => {
                let token = response.json::<TokenResponse>().await?;
                debug!("Refreshed session for user {}", token.user.id);
                self.establish(token.into()).await.map(Some)
            }
            Err(AuthError::Rejected { status, message }) => {
                warn!("Session refresh rejected ({status}): {message}");
                self.forget().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl AuthApi for GoTrueAuthClient {
    #[instrument(skip(self))]
    async fn request_code(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email)?;

        self.post(
            "/otp",
            &OtpRequest {
                email: &email,
                create_user: true,
            },
            None,
        )
        .await?;

        info!("Passcode requested");
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn verify_code(&self, email: &str, code: &str) -> AuthResult<Session> {
        let email = normalize_email(email)?;
        let code = normalize_code(code)?;

        let response = self
            .post(
                "/verify",
                &VerifyRequest {
                    kind: "email",
                    email: &email,
                    token: &code,
                },
                None,
            )
            .await?;

        let token = response.json::<TokenResponse>().await?;
        let session = self.establish(token.into()).await?;

        info!("Signed in as user {}", session.user.id);
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> AuthResult<()> {
        let current = self.session.borrow().clone();

        if let Some(session) = current {
            match self
                .post("/logout", &serde_json::json!({}), Some(&session.access_token))
                .await
            {
                Ok(_) => debug!("Session revoked"),
                // The token may already be expired server-side
                Err(AuthError::Rejected { status, .. })
                    if status == StatusCode::UNAUTHORIZED.as_u16()
                        || status == StatusCode::NOT_FOUND.as_u16() =>
                {
                    debug!("Session already invalid on the server");
                }
                Err(e) => warn!("Failed to revoke session, signing out locally: {e}"),
            }
        }

        self.forget().await?;
        info!("Signed out");
        Ok(())
    }

    async fn current_session(&self) -> AuthResult<Option<Session>> {
        let current = self.session.borrow().clone();
        let Some(session) = current else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        let latest = self.session.borrow().clone();
        match latest {
            Some(latest) if !latest.is_expired(Utc::now()) => Ok(Some(latest)),
            Some(latest) => self.refresh(&latest).await,
            None => Ok(None),
        }
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }
}
