#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use club_client::auth::{AuthApi, AuthError, AuthResult, Session, SessionUser};
use club_client::{ClubClient, ClubSettings};
use club_storage::testing::{CallLog, InMemoryBeerStorage, InMemoryBlobStorage};
use image::{ImageFormat, Rgb, RgbImage};
use tokio::sync::watch;

pub const CLUB_ID: &str = "test-club";
pub const USER_ID: &str = "member-1";

/// Auth collaborator with a fixed session that counts server calls
pub struct FakeAuth {
    session: watch::Sender<Option<Session>>,
    network_calls: AtomicUsize,
}

impl FakeAuth {
    pub fn signed_in() -> Self {
        Self::with_session(Some(session()))
    }

    pub fn signed_out() -> Self {
        Self::with_session(None)
    }

    fn with_session(session: Option<Session>) -> Self {
        let (sender, _) = watch::channel(session);
        Self {
            session: sender,
            network_calls: AtomicUsize::new(0),
        }
    }

    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }
}

pub fn session() -> Session {
    Session {
        access_token: "access-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        expires_at: chrono::Utc::now().timestamp() + 3600,
        user: SessionUser {
            id: USER_ID.to_string(),
            email: Some("member@example.com".to_string()),
        },
    }
}

#[async_trait]
impl AuthApi for FakeAuth {
    async fn request_code(&self, email: &str) -> AuthResult<()> {
        club_client::auth::normalize_email(email)?;
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn verify_code(&self, email: &str, code: &str) -> AuthResult<Session> {
        club_client::auth::normalize_email(email)?;
        club_client::auth::normalize_code(code)?;
        self.network_calls.fetch_add(1, Ordering::SeqCst);

        if code != "123456" {
            return Err(AuthError::Rejected {
                status: 403,
                message: "Token has expired or is invalid".to_string(),
            });
        }

        let session = session();
        self.session.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        self.session.send_replace(None);
        Ok(())
    }

    async fn current_session(&self) -> AuthResult<Option<Session>> {
        Ok(self.session.borrow().clone())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }
}

/// Client wired to in-memory collaborators sharing one call log
pub struct TestClub {
    pub client: ClubClient,
    pub auth: Arc<FakeAuth>,
    pub rows: Arc<InMemoryBeerStorage>,
    pub blobs: Arc<InMemoryBlobStorage>,
    pub log: CallLog,
}

impl TestClub {
    pub fn signed_in() -> Self {
        Self::with_auth(FakeAuth::signed_in())
    }

    pub fn signed_out() -> Self {
        Self::with_auth(FakeAuth::signed_out())
    }

    fn with_auth(auth: FakeAuth) -> Self {
        let log = CallLog::default();
        let auth = Arc::new(auth);
        let rows = Arc::new(InMemoryBeerStorage::new(log.clone()));
        let blobs = Arc::new(InMemoryBlobStorage::new(log.clone()));

        let client = ClubClient::new(
            auth.clone(),
            rows.clone(),
            blobs.clone(),
            ClubSettings {
                club_id: CLUB_ID.to_string(),
                url_ttl: Duration::from_secs(600),
                list_retry_delay: Duration::from_millis(1),
            },
        );

        Self {
            client,
            auth,
            rows,
            blobs,
            log,
        }
    }

    /// Whether any collaborator saw a call
    pub fn network_silent(&self) -> bool {
        self.log.is_empty() && self.auth.network_calls() == 0
    }
}

/// PNG of the given size with a horizontal gradient
pub fn png(width: u32, height: u32) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let image = RgbImage::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, 90, 30]));

    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encode test png");
    bytes.into_inner()
}
