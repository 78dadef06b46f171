//! Incremental synchronization of SciELO articles.
//!
//! Walks subject -> journal -> issue -> article, derives the XML and PDF artifacts of each
//! article and downloads the ones not yet present under `scielo/{date}/{KIND}/{journal}/{issue}/`.
//! The filesystem is the only state, so interrupted runs resume by simply running again.

mod catalog;
mod config;
mod error;
mod fetch;
mod http;
mod limiter;
mod listing;
mod model;
mod report;
mod resolver;
mod store;
mod sync;
mod walker;

pub use catalog::{CatalogIndex, Subject};
pub use config::{CrawlerConfig, RetryPolicy, Throttle, MAX_CONCURRENT_DOWNLOADS};
pub use error::{CrawlError, FetchError, FetchErrorKind};
pub use fetch::FetchExecutor;
pub use http::Http;
pub use limiter::Pacer;
pub use model::{Article, Artifact, ArtifactKind, Issue, Journal, Mode, Rendition};
pub use report::{FailedArtifact, RunReport, RunSummary, FAILURES_FILE, SUMMARY_FILE};
pub use resolver::ArtifactResolver;
pub use store::{DownloadRecord, LocalStore, StoreError};
pub use sync::{Level, Phase, Scope, StopHandle, SyncOrchestrator};
pub use walker::HierarchyWalker;

pub use anyhow;
