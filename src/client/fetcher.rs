use crate::config::SourceConfig;
use crate::{Error, Result};
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

/// User agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Jitter added on top of each exponential backoff step
const BACKOFF_JITTER_MS: u64 = 1000;

/// Rate-limited, retrying HTTP text fetcher for one source.
///
/// The last-request timestamp is per instance, so independent clients (and
/// tests) never cross-contaminate each other's spacing. All calls through one
/// instance are serialized by the spacing rule; with a shared long-lived
/// client that is intentional self-throttling.
pub struct RateLimitedFetcher {
    source_name: String,
    http: Client,
    min_interval: Duration,
    backoff_base: Duration,
    max_attempts: u32,
    last_request: Mutex<Option<Instant>>,
    user_agent_index: Mutex<usize>,
}

impl RateLimitedFetcher {
    /// Build a fetcher from per-source configuration
    pub fn new(source_name: &str, config: &SourceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()
            .map_err(|e| Error::Service(format!("Failed to create HTTP client: {e}")))?;

        debug!(
            source = source_name,
            interval_ms = config.min_request_interval_ms,
            "Created rate-limited fetcher"
        );

        Ok(Self {
            source_name: source_name.to_string(),
            http,
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            max_attempts: config.max_attempts.max(1),
            last_request: Mutex::new(None),
            user_agent_index: Mutex::new(0),
        })
    }

    /// Fetch a URL and return the response body as text.
    ///
    /// Retries 429 and 5xx responses with jittered exponential backoff up to
    /// the configured attempt ceiling. A 403 is terminal: it signals missing
    /// or expired credentials, and the message distinguishes the two based on
    /// whether a cookie header was attached.
    pub async fn fetch_text(&self, url: &str, cookie_header: Option<&str>) -> Result<String> {
        let mut last_status: Option<u16> = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt - 1);
                warn!(
                    source = %self.source_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after transient failure"
                );
                sleep(delay).await;
            }

            self.pace().await;

            match self.send_once(url, cookie_header).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.text().await.map_err(Error::Http);
                    }

                    if status == StatusCode::FORBIDDEN {
                        return Err(self.access_denied(cookie_header.is_some()));
                    }

                    if Self::is_transient(status) {
                        last_status = Some(status.as_u16());
                        continue;
                    }

                    return Err(Error::RequestFailed {
                        source_name: self.source_name.clone(),
                        status: status.as_u16(),
                        message: format!("HTTP {status} from {url}"),
                    });
                }
                Err(e) => {
                    // Transport errors carrying a retryable status get the
                    // same backoff treatment as the status itself
                    if let Some(status) = e.status() {
                        if Self::is_transient(status) {
                            last_status = Some(status.as_u16());
                            continue;
                        }
                        if status == StatusCode::FORBIDDEN {
                            return Err(self.access_denied(cookie_header.is_some()));
                        }
                    }
                    return Err(Error::Http(e));
                }
            }
        }

        Err(Error::RequestFailed {
            source_name: self.source_name.clone(),
            status: last_status.unwrap_or(0),
            message: format!("retries exhausted after {} attempts", self.max_attempts),
        })
    }

    /// Compute the backoff delay for a given retry index:
    /// `base * 2^attempt + random(0..1000ms)`
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.backoff_base.as_millis() as u64 * (1u64 << attempt.min(16));
        let jitter = rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS);
        Duration::from_millis(exponential + jitter)
    }

    /// Suspend until the minimum inter-request spacing has elapsed, then
    /// stamp this call's start time.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(
                    source = %self.source_name,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limiter: waiting"
                );
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn send_once(
        &self,
        url: &str,
        cookie_header: Option<&str>,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let user_agent = self.next_user_agent().await;

        let mut request = self
            .http
            .get(url)
            .header("User-Agent", user_agent)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .header("Upgrade-Insecure-Requests", "1");

        if let Some(cookies) = cookie_header {
            request = request.header("Cookie", cookies);
        }

        request.send().await
    }

    fn access_denied(&self, credentials_attempted: bool) -> Error {
        let message = if credentials_attempted {
            format!(
                "{} rejected the stored session cookies - the session has likely expired, re-authenticate and try again",
                self.source_name
            )
        } else {
            format!(
                "{} requires authentication and no session cookies are present - authenticate first",
                self.source_name
            )
        };
        Error::AccessDenied {
            message,
            credentials_attempted,
        }
    }

    fn is_transient(status: StatusCode) -> bool {
        status.as_u16() == 429 || status.is_server_error()
    }

    async fn next_user_agent(&self) -> &'static str {
        let mut index = self.user_agent_index.lock().await;
        let user_agent = USER_AGENTS[*index % USER_AGENTS.len()];
        *index = (*index + 1) % USER_AGENTS.len();
        user_agent
    }

    /// Minimum spacing between requests from this instance
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
