//! Session lifecycle tool for the institutional source: run interactive
//! login, report status, or clear the stored session.

use crate::client::JstorClient;
use crate::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// What the authenticate tool should do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthAction {
    /// Launch the interactive login flow and capture the session
    #[default]
    Authenticate,
    /// Report the current session state without side effects
    Status,
    /// Delete the stored session
    Clear,
}

/// Input parameters for the authenticate tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateInput {
    /// Login page to open; defaults to the source's base URL
    #[serde(default)]
    pub jstor_url: Option<String>,
    /// Action to perform (default: authenticate)
    #[serde(default)]
    pub action: AuthAction,
}

/// Session lifecycle operations exposed as a tool
#[derive(Clone)]
pub struct AuthenticateTool {
    jstor: Arc<JstorClient>,
}

impl std::fmt::Debug for AuthenticateTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateTool").finish()
    }
}

impl AuthenticateTool {
    #[must_use]
    pub fn new(jstor: Arc<JstorClient>) -> Self {
        Self { jstor }
    }

    /// Dispatch on the requested action and return a JSON payload
    #[instrument(skip(self, input), fields(action = ?input.action))]
    pub async fn execute(&self, input: AuthenticateInput) -> Result<serde_json::Value> {
        match input.action {
            AuthAction::Authenticate => {
                let report = self.jstor.authenticate(input.jstor_url.as_deref()).await?;
                info!(success = report.success, "Interactive authentication finished");
                Ok(serde_json::to_value(report)?)
            }
            AuthAction::Status => Ok(serde_json::to_value(self.jstor.auth_status())?),
            AuthAction::Clear => {
                self.jstor.clear_authentication().await?;
                Ok(serde_json::json!({
                    "cleared": true,
                    "message": "Stored session removed"
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, SourceConfig};
    use crate::session::SystemBrowserAuthenticator;
    use tempfile::tempdir;

    fn tool_with(dir: &std::path::Path) -> AuthenticateTool {
        let session_config = SessionConfig {
            cookie_file: dir.join("session.json"),
            ..SessionConfig::default()
        };
        let authenticator = Arc::new(SystemBrowserAuthenticator::new(dir.join("handoff.json")));
        let jstor =
            JstorClient::new(&SourceConfig::jstor(), session_config, authenticator).unwrap();
        AuthenticateTool::new(Arc::new(jstor))
    }

    #[test]
    fn test_action_deserializes_lowercase() {
        let input: AuthenticateInput =
            serde_json::from_str(r#"{"action": "status"}"#).unwrap();
        assert_eq!(input.action, AuthAction::Status);

        let input: AuthenticateInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input.action, AuthAction::Authenticate);
        assert!(input.jstor_url.is_none());
    }

    #[tokio::test]
    async fn test_status_before_any_authentication() {
        let dir = tempdir().unwrap();
        let tool = tool_with(dir.path());

        let payload = tool
            .execute(AuthenticateInput {
                jstor_url: None,
                action: AuthAction::Status,
            })
            .await
            .unwrap();
        assert_eq!(payload["authenticated"], false);
        assert_eq!(payload["cookiesPresent"], false);
    }

    #[tokio::test]
    async fn test_clear_without_session_succeeds() {
        let dir = tempdir().unwrap();
        let tool = tool_with(dir.path());

        let payload = tool
            .execute(AuthenticateInput {
                jstor_url: None,
                action: AuthAction::Clear,
            })
            .await
            .unwrap();
        assert_eq!(payload["cleared"], true);
    }
}
