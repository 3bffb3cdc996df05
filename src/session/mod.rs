//! Authentication session lifecycle for the institutional source.
//!
//! One session slot: interactive login capture, cookie persistence with a
//! fixed TTL, expiry-on-read, and status/clear operations. The state machine
//! is NoSession -> Authenticating -> Authenticated -> Expired/Cleared.

pub mod browser;

pub use browser::{CapturedCookie, InteractiveAuthenticator, SystemBrowserAuthenticator};

use crate::client::fetcher::RateLimitedFetcher;
use crate::config::SessionConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Persisted session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Serialized `name=value; ...` header attached to requests
    pub cookie_header: String,
    /// Raw captured cookies
    pub cookies: Vec<CapturedCookie>,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
    /// `timestamp` plus the configured TTL
    pub expires_at: i64,
}

/// Report produced by an authenticate call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthReport {
    pub success: bool,
    pub cookies_captured: usize,
    /// Result of the post-capture validation probe, when one ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_valid: Option<bool>,
    pub message: String,
}

/// Current session status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub cookies_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_age_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_minutes: Option<i64>,
}

impl AuthStatus {
    const fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            cookies_present: false,
            session_age_minutes: None,
            expires_in_minutes: None,
        }
    }
}

/// Page-text markers that indicate a signed-in account menu
const SIGNED_IN_MARKERS: &[&str] = &["sign out", "log out", "my workspace", "my account"];

/// Page-text markers for the search interface; only count when the context
/// is on the target domain
const SEARCH_INTERFACE_MARKERS: &[&str] = &["advanced search", "search jstor", "search journals"];

/// Owns the session slot for the institutional source
pub struct SessionManager {
    config: SessionConfig,
    target_domain: String,
    probe_url: String,
    authenticator: Arc<dyn InteractiveAuthenticator>,
    probe_fetcher: Arc<RateLimitedFetcher>,
    cached_header: RwLock<Option<String>>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        base_url: &str,
        authenticator: Arc<dyn InteractiveAuthenticator>,
        probe_fetcher: Arc<RateLimitedFetcher>,
    ) -> Self {
        let target_domain = url::Url::parse(base_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
            .unwrap_or_else(|| "jstor.org".to_string());

        Self {
            config,
            target_domain,
            probe_url: base_url.trim_end_matches('/').to_string(),
            authenticator,
            probe_fetcher,
            cached_header: RwLock::new(None),
        }
    }

    /// Run the interactive login flow: navigate, poll for completion
    /// signals, capture and persist cookies, probe the session once. The
    /// interactive context is torn down on every exit path.
    #[instrument(skip(self))]
    pub async fn authenticate(&self, url: Option<&str>) -> Result<AuthReport> {
        let target = url.unwrap_or(&self.probe_url).to_string();
        info!(url = %target, "Starting interactive authentication");

        self.authenticator.launch().await?;
        let result = self.drive_login(&target).await;
        self.authenticator.close().await;
        result
    }

    async fn drive_login(&self, target: &str) -> Result<AuthReport> {
        self.authenticator.navigate(target).await?;

        let timeout = Duration::from_secs(self.config.auth_timeout_secs);
        let poll_interval = Duration::from_secs(self.config.auth_poll_interval_secs);
        let started = Instant::now();

        loop {
            let text = self.authenticator.page_text().await?;
            let current = self.authenticator.current_url().await?;
            if self.login_complete(&text, &current) {
                debug!("Authentication-complete signal observed");
                break;
            }
            if started.elapsed() >= timeout {
                warn!("Interactive authentication timed out");
                return Err(Error::AuthenticationTimeout { timeout });
            }
            sleep(poll_interval).await;
        }

        let all_cookies = self.authenticator.cookies().await?;
        let cookies = self.filter_cookies(all_cookies);
        if cookies.is_empty() {
            return Ok(AuthReport {
                success: false,
                cookies_captured: 0,
                session_valid: None,
                message: "Login completed but no relevant cookies were captured".to_string(),
            });
        }

        let cookie_header = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        let now = chrono::Utc::now().timestamp_millis();
        let record = SessionRecord {
            cookie_header: cookie_header.clone(),
            cookies: cookies.clone(),
            timestamp: now,
            expires_at: now + (self.config.ttl_hours as i64) * 60 * 60 * 1000,
        };
        self.persist_record(&record)?;
        *self.cached_header.write().await = Some(cookie_header.clone());

        let session_valid = self.probe_session(&cookie_header).await;
        info!(
            cookies = cookies.len(),
            session_valid, "Authentication complete, session persisted"
        );

        Ok(AuthReport {
            success: true,
            cookies_captured: cookies.len(),
            session_valid: Some(session_valid),
            message: format!(
                "Captured {} cookies; session valid until {}",
                cookies.len(),
                chrono::DateTime::from_timestamp_millis(record.expires_at)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            ),
        })
    }

    fn login_complete(&self, page_text: &str, current_url: &str) -> bool {
        let lowered = page_text.to_lowercase();
        if SIGNED_IN_MARKERS.iter().any(|m| lowered.contains(m)) {
            return true;
        }
        current_url.contains(&self.target_domain)
            && SEARCH_INTERFACE_MARKERS.iter().any(|m| lowered.contains(m))
    }

    /// Keep cookies scoped to the target site or identity provider, plus any
    /// whose name suggests session/auth state
    fn filter_cookies(&self, cookies: Vec<CapturedCookie>) -> Vec<CapturedCookie> {
        cookies
            .into_iter()
            .filter(|c| {
                let name = c.name.to_lowercase();
                c.domain.contains(&self.target_domain)
                    || c.domain.contains(&self.config.idp_domain)
                    || name.contains("session")
                    || name.contains("auth")
            })
            .collect()
    }

    /// Lightweight authenticated request to check the captured session works
    async fn probe_session(&self, cookie_header: &str) -> bool {
        match self
            .probe_fetcher
            .fetch_text(&self.probe_url, Some(cookie_header))
            .await
        {
            Ok(body) => {
                let lowered = body.to_lowercase();
                SIGNED_IN_MARKERS.iter().any(|m| lowered.contains(m))
                    || !lowered.contains("log in")
            }
            Err(e) => {
                warn!(error = %e, "Session validation probe failed");
                false
            }
        }
    }

    /// Read the persisted record; expired records are deleted on read.
    /// Returns the cookie header and caches it in memory.
    pub async fn load_stored_cookies(&self) -> Result<Option<String>> {
        match self.load_record()? {
            Some(record) => {
                let header = record.cookie_header;
                *self.cached_header.write().await = Some(header.clone());
                Ok(Some(header))
            }
            None => Ok(None),
        }
    }

    /// Current session status; `authenticated: false` with no age fields when
    /// no valid record exists
    pub fn auth_status(&self) -> AuthStatus {
        match self.load_record() {
            Ok(Some(record)) => {
                let now = chrono::Utc::now().timestamp_millis();
                AuthStatus {
                    authenticated: true,
                    cookies_present: !record.cookies.is_empty(),
                    session_age_minutes: Some((now - record.timestamp) / 60_000),
                    expires_in_minutes: Some((record.expires_at - now) / 60_000),
                }
            }
            _ => AuthStatus::unauthenticated(),
        }
    }

    /// Delete the persisted record and in-memory cache; absence of a record
    /// is not an error
    pub async fn clear_authentication(&self) -> Result<()> {
        let path = self.record_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
            info!(path = %path.display(), "Cleared persisted session");
        }
        *self.cached_header.write().await = None;
        Ok(())
    }

    /// Whether a usable session exists (cached in memory or loadable and
    /// unexpired on disk)
    pub async fn has_valid_authentication(&self) -> bool {
        if self.cached_header.read().await.is_some() {
            return true;
        }
        matches!(self.load_stored_cookies().await, Ok(Some(_)))
    }

    fn record_path(&self) -> PathBuf {
        self.config.cookie_file.clone()
    }

    fn load_record(&self) -> Result<Option<SessionRecord>> {
        let path = self.record_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let record: SessionRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Session record is corrupt; removing");
                std::fs::remove_file(&path)?;
                return Ok(None);
            }
        };

        let now = chrono::Utc::now().timestamp_millis();
        if now > record.expires_at {
            debug!("Session record expired; removing");
            std::fs::remove_file(&path)?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    fn persist_record(&self, record: &SessionRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(self.record_path(), content)?;
        debug!(path = %self.record_path().display(), "Persisted session record");
        Ok(())
    }
}
