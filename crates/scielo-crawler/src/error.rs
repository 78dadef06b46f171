use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Listing and resolution failures. Only `InvalidSubject` is fatal, and only to the call that
/// received the bad value; every other kind is skipped and accounted for by the orchestrator.
#[derive(Debug, Clone, Error)]
pub enum CrawlError {
    #[error("invalid subject `{0}`, expected 1-8 or one of the thematic area names")]
    InvalidSubject(String),

    #[error("catalog unavailable at {url}: {reason}")]
    CatalogUnavailable { url: String, reason: String },

    #[error("malformed listing at {url}: {reason}")]
    MalformedListing { url: String, reason: String },

    #[error("article gone: {url}")]
    ArticleGone { url: String },

    #[error("transport error resolving {url}: {reason}")]
    ResolverTransport { url: String, reason: String },
}

impl CrawlError {
    pub(crate) fn unavailable(url: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::CatalogUnavailable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(url: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::MalformedListing {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchErrorKind {
    /// Not worth retrying: 404, malformed body, local I/O failure, disallowed URL
    Permanent,
    /// Transient failures persisted through every allowed attempt
    Exhausted,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?} failure fetching {url}: {reason}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub reason: String,
}

impl FetchError {
    pub(crate) fn permanent(url: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn exhausted(url: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self {
            kind: FetchErrorKind::Exhausted,
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
