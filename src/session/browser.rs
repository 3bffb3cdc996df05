//! Interactive browser capability behind the session manager.
//!
//! Browser-mediated single-sign-on cannot be driven headlessly from this
//! process, so the capability is a trait: the session manager polls whatever
//! implementation it is given for authentication-complete signals and then
//! extracts cookies from it. The shipped implementation opens the system
//! browser and watches a cookie-handoff file the user exports once logged in;
//! tests use a scripted fake.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cookie entry matching the browser export format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub expires: Option<f64>,
}

/// Capability contract for interactive login: launch, navigate, expose page
/// signals, surrender cookies, tear down.
#[async_trait]
pub trait InteractiveAuthenticator: Send + Sync {
    /// Bring up the interactive context
    async fn launch(&self) -> Result<()>;

    /// Point the context at the login URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Visible page text, as far as the implementation can observe it
    async fn page_text(&self) -> Result<String>;

    /// URL the context currently reports
    async fn current_url(&self) -> Result<String>;

    /// All cookies currently held by the context
    async fn cookies(&self) -> Result<Vec<CapturedCookie>>;

    /// Tear down the context; must be safe to call on every exit path
    async fn close(&self);
}

/// Opens the platform browser for the user and waits for a cookie-handoff
/// file exported from it.
///
/// Once the user has completed the institutional login they export cookies
/// (browser devtools or a cookie-export extension) as JSON to the handoff
/// path; the file's appearance is the authentication-complete signal.
pub struct SystemBrowserAuthenticator {
    handoff_path: PathBuf,
    navigated_url: Mutex<Option<String>>,
}

impl SystemBrowserAuthenticator {
    #[must_use]
    pub fn new(handoff_path: PathBuf) -> Self {
        Self {
            handoff_path,
            navigated_url: Mutex::new(None),
        }
    }

    fn open_command() -> &'static str {
        if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        }
    }
}

#[async_trait]
impl InteractiveAuthenticator for SystemBrowserAuthenticator {
    async fn launch(&self) -> Result<()> {
        // Stale handoff files would satisfy the poll immediately
        if self.handoff_path.exists() {
            std::fs::remove_file(&self.handoff_path)?;
            debug!("Removed stale cookie handoff file");
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        *self.navigated_url.lock().await = Some(url.to_string());

        Command::new(Self::open_command())
            .arg(url)
            .spawn()
            .map_err(|e| {
                Error::AuthenticationFailed(format!("Could not open system browser: {e}"))
            })?;

        info!(
            url,
            handoff = %self.handoff_path.display(),
            "Opened system browser - complete the institutional login, then export cookies as JSON to the handoff path"
        );
        Ok(())
    }

    async fn page_text(&self) -> Result<String> {
        // The only page state observable from outside the browser is whether
        // the user has finished and exported cookies
        if self.handoff_path.exists() {
            Ok("sign out".to_string())
        } else {
            Ok(String::new())
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .navigated_url
            .lock()
            .await
            .clone()
            .unwrap_or_default())
    }

    async fn cookies(&self) -> Result<Vec<CapturedCookie>> {
        if !self.handoff_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.handoff_path)?;
        match serde_json::from_str::<Vec<CapturedCookie>>(&content) {
            Ok(cookies) => Ok(cookies),
            Err(e) => {
                warn!(error = %e, "Cookie handoff file is not valid cookie JSON");
                Ok(Vec::new())
            }
        }
    }

    async fn close(&self) {
        if self.handoff_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.handoff_path) {
                warn!(error = %e, "Failed to remove cookie handoff file");
            }
        }
        *self.navigated_url.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_handoff_file_drives_signals() {
        let dir = tempdir().unwrap();
        let handoff = dir.path().join("cookies.json");
        let authenticator = SystemBrowserAuthenticator::new(handoff.clone());

        assert_eq!(authenticator.page_text().await.unwrap(), "");

        let cookies = vec![CapturedCookie {
            name: "JSESSIONID".to_string(),
            value: "abc".to_string(),
            domain: ".jstor.org".to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: true,
            expires: None,
        }];
        std::fs::write(&handoff, serde_json::to_string(&cookies).unwrap()).unwrap();

        assert_eq!(authenticator.page_text().await.unwrap(), "sign out");
        assert_eq!(authenticator.cookies().await.unwrap().len(), 1);

        authenticator.close().await;
        assert!(!handoff.exists());
    }

    #[tokio::test]
    async fn test_invalid_handoff_yields_no_cookies() {
        let dir = tempdir().unwrap();
        let handoff = dir.path().join("cookies.json");
        std::fs::write(&handoff, "not json").unwrap();

        let authenticator = SystemBrowserAuthenticator::new(handoff);
        assert!(authenticator.cookies().await.unwrap().is_empty());
    }
}
