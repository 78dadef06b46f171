use std::cmp;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::limiter::MAX_SPACING;

/// Upper bound on simultaneous artifact downloads, whatever the configuration says.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    #[serde(default = "default_throttle")]
    pub throttle: Option<Throttle>,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub min_year: Option<i32>,

    #[serde(default = "default_preferred_languages")]
    pub preferred_languages: Vec<String>,

    #[serde(default = "default_true")]
    pub respect_robots: bool,

    #[serde(default = "default_true")]
    pub verify_content: bool,

    #[serde(default = "default_true")]
    pub write_report: bool,

    #[serde(default = "default_true")]
    pub handle_sigint: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            output_dir: default_output_dir(),
            user_agent: default_user_agent(),
            concurrent_downloads: default_concurrent_downloads(),
            throttle: default_throttle(),
            retry: RetryPolicy::default(),
            request_timeout_secs: default_request_timeout_secs(),
            min_year: None,
            preferred_languages: default_preferred_languages(),
            respect_robots: true,
            verify_content: true,
            write_report: true,
            handle_sigint: true,
        }
    }
}

impl CrawlerConfig {
    /// Fetch pool size actually used, always within `1..=MAX_CONCURRENT_DOWNLOADS`.
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrent_downloads > MAX_CONCURRENT_DOWNLOADS {
            log::warn!(
                "Capping concurrent downloads from {} to {MAX_CONCURRENT_DOWNLOADS}",
                self.concurrent_downloads
            );
        }
        self.concurrent_downloads.clamp(1, MAX_CONCURRENT_DOWNLOADS)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    String::from("https://www.scielo.br")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_user_agent() -> String {
    format!("scielo-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_concurrent_downloads() -> usize {
    cmp::min(4, cmp::max(1, num_cpus::get() / 2))
}

fn default_throttle() -> Option<Throttle> {
    None
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_preferred_languages() -> Vec<String> {
    ["pt", "es", "en"].iter().map(|l| l.to_string()).collect()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Throttle {
    /// The number of requests per second
    PerSecond(NonZeroUsize),
    /// The delay in seconds between requests
    Delay(f32),
}

impl Throttle {
    /// Minimum spacing between two request starts.
    pub fn spacing(&self) -> Duration {
        match self {
            Self::PerSecond(n) => {
                Duration::from_secs(1) / u32::try_from(n.get()).unwrap_or(u32::MAX)
            }
            Self::Delay(secs) => Duration::try_from_secs_f32(secs.max(0.))
                .map_or(MAX_SPACING, |d| d.min(MAX_SPACING)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Ceiling on any cool-down, including one asked for by a `Retry-After` header
    #[serde(default = "default_max_cooldown_secs")]
    pub max_cooldown_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            cooldown_secs: default_cooldown_secs(),
            max_cooldown_secs: default_max_cooldown_secs(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based) before trying again.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs).min(self.max_cooldown())
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_secs)
    }

    pub(crate) fn attempts(&self) -> u32 {
        cmp::max(1, self.max_attempts)
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_max_cooldown_secs() -> u64 {
    900
}
