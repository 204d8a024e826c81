//! Liveness probing of published review URLs.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub alive: bool,
    /// Human-readable probe result ("200 OK", "404 Not Found", "timeout", ...)
    pub status: String,
}

/// Probes whether a published review is still reachable on the platform.
/// Behind a trait so tests and the sweep can swap in a deterministic checker.
#[async_trait]
pub trait ReviewUrlChecker: Send + Sync {
    async fn check(&self, url: &str) -> CheckOutcome;
}

pub struct HttpUrlChecker {
    client: reqwest::Client,
}

impl HttpUrlChecker {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReviewUrlChecker for HttpUrlChecker {
    async fn check(&self, url: &str) -> CheckOutcome {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(url, %status, "url probe completed");
                CheckOutcome {
                    alive: status.is_success(),
                    status: status.to_string(),
                }
            }
            Err(e) => {
                let status = if e.is_timeout() {
                    "timeout".to_string()
                } else if e.is_connect() {
                    "connection failed".to_string()
                } else {
                    format!("request error: {e}")
                };
                debug!(url, status, "url probe failed");
                CheckOutcome { alive: false, status }
            }
        }
    }
}

/// Fixed-outcome checker for tests.
pub struct StaticUrlChecker {
    pub alive: bool,
    pub status: String,
}

impl StaticUrlChecker {
    pub fn alive() -> Self {
        Self {
            alive: true,
            status: "200 OK".to_string(),
        }
    }

    pub fn dead() -> Self {
        Self {
            alive: false,
            status: "404 Not Found".to_string(),
        }
    }
}

#[async_trait]
impl ReviewUrlChecker for StaticUrlChecker {
    async fn check(&self, _url: &str) -> CheckOutcome {
        CheckOutcome {
            alive: self.alive,
            status: self.status.clone(),
        }
    }
}
