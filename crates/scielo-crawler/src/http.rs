use std::future::Future;
use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::header::{RETRY_AFTER, USER_AGENT};
use reqwest::{Response, StatusCode};
use texting_robots::Robot;
use thiserror::Error;
use url::Url;

use crate::config::{CrawlerConfig, RetryPolicy};
use crate::limiter::{Pacer, MAX_SPACING};

/// Outcome of one request attempt that did not produce a usable response.
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// Connection reset, timeout, HTTP 5xx or 429
    #[error("{0}")]
    Transient(String),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Permanent(String),
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Permanent(String),
}

/// Runs `op` until it succeeds, fails permanently, or the policy runs out of attempts.
///
/// Only [`Failure::Transient`] is retried, with exponential backoff between attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(Failure::NotFound) => return Err(RetryError::NotFound),
            Err(Failure::Permanent(reason)) => return Err(RetryError::Permanent(reason)),
            Err(Failure::Transient(reason)) if attempt >= attempts => {
                return Err(RetryError::Exhausted { attempts, reason })
            }
            Err(Failure::Transient(reason)) => {
                let backoff = policy.backoff(attempt);
                log::debug!(
                    "Attempt {attempt}/{attempts} for {what} failed ({reason}), retrying in {backoff:?}"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// HTTP access shared by every component: one client, one pacer, one robots.txt.
pub struct Http {
    client: reqwest::Client,
    base_url: Url,
    user_agent: String,
    retry: RetryPolicy,
    pacer: Pacer,
    robot: OnceCell<Option<Robot>>,
}

impl Http {
    pub fn new(config: &CrawlerConfig) -> anyhow::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .deflate(true)
            .timeout(config.request_timeout())
            .build()?;
        let base_url = Url::parse(&config.base_url)?;
        let spacing = config
            .throttle
            .map(|t| t.spacing())
            .unwrap_or(Duration::ZERO);
        Ok(Self {
            client,
            base_url,
            user_agent: config.user_agent.clone(),
            retry: config.retry.clone(),
            pacer: Pacer::new(spacing),
            robot: OnceCell::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Builds an absolute platform URL from a path such as `/j/alm/grid`.
    pub fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    /// Fetches and installs the platform's robots.txt. Any failure means everything is allowed.
    pub async fn load_robots(&self) {
        if self.robot.get().is_some() {
            return;
        }
        let robot = match self.fetch_robots().await {
            Ok(robot) => robot,
            Err(e) => {
                log::warn!("Couldn't load robots.txt, assuming everything is allowed: {e}");
                None
            }
        };
        if let Some(delay) = robot.as_ref().and_then(|r| r.delay) {
            match Duration::try_from_secs_f32(delay.max(0.)) {
                Ok(spacing) => self.pacer.at_least(spacing),
                Err(e) => {
                    log::warn!("Crawl-delay {delay} is out of range ({e}), using {MAX_SPACING:?}");
                    self.pacer.at_least(MAX_SPACING);
                }
            }
        }
        self.robot.set(robot).ok();
    }

    async fn fetch_robots(&self) -> anyhow::Result<Option<Robot>> {
        let url = self.url("/robots.txt")?;
        let resp = self.get_raw(&url).await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let txt = resp.bytes().await?;
        Ok(Some(Robot::new(&self.user_agent, &txt)?))
    }

    pub fn allowed(&self, url: &Url) -> bool {
        match self.robot.get() {
            Some(Some(robot)) => robot.allowed(url.as_str()),
            _ => true,
        }
    }

    async fn get_raw(&self, url: &Url) -> reqwest::Result<Response> {
        self.pacer.wait().await;
        self.client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
    }

    /// One paced GET, with the status mapped to a [`Failure`] class.
    pub async fn get(&self, url: &Url) -> Result<Response, Failure> {
        if !self.allowed(url) {
            return Err(Failure::Permanent("disallowed by robots.txt".into()));
        }
        let resp = self
            .get_raw(url)
            .await
            .map_err(|e| Failure::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let delay = retry_after(&resp)
                    .unwrap_or_else(|| self.retry.cooldown())
                    .min(self.retry.max_cooldown());
                self.pacer.cool_down(delay);
                Failure::Transient(format!("HTTP {status}"))
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Failure::NotFound,
            StatusCode::REQUEST_TIMEOUT => Failure::Transient(format!("HTTP {status}")),
            s if s.is_server_error() => Failure::Transient(format!("HTTP {status}")),
            _ => Failure::Permanent(format!("HTTP {status}")),
        })
    }

    /// GET with retries, returning the body as text.
    pub async fn text(&self, url: &Url) -> Result<String, RetryError> {
        with_retry(&self.retry, url.as_str(), |_| async move {
            let resp = self.get(url).await?;
            resp.text()
                .await
                .map_err(|e| Failure::Transient(e.to_string()))
        })
        .await
    }
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
