use std::sync::Arc;

use futures::TryStreamExt;

use crate::error::FetchError;
use crate::http::{with_retry, Failure, Http, RetryError};
use crate::model::Artifact;
use crate::store::{DownloadRecord, LocalStore, StoreError};

/// Downloads artifacts into the [`LocalStore`], retrying transient failures.
pub struct FetchExecutor {
    http: Arc<Http>,
    store: LocalStore,
}

impl FetchExecutor {
    pub fn new(http: Arc<Http>, store: LocalStore) -> Self {
        Self { http, store }
    }

    /// Fetches `artifact` to its store path, streaming the body to disk.
    ///
    /// An interrupted transfer counts as transient and restarts from scratch; a body that is
    /// not a valid artifact, a 404 or a local I/O failure is permanent.
    pub async fn fetch(&self, artifact: &Artifact) -> Result<DownloadRecord, FetchError> {
        let path = self.store.path_for(artifact);
        let url = &artifact.url;
        let res = with_retry(self.http.retry_policy(), url.as_str(), |_| {
            let path = &path;
            async move {
                let resp = self.http.get(url).await?;
                let body = resp.bytes_stream().map_err(|e| e.to_string());
                self.store
                    .write(path, artifact.kind, body)
                    .await
                    .map_err(|e| match e {
                        StoreError::Interrupted(reason) => Failure::Transient(reason),
                        StoreError::Invalid(reason) => Failure::Permanent(reason),
                        StoreError::Io(e) => Failure::Permanent(format!("local I/O: {e}")),
                    })
            }
        })
        .await;

        match res {
            Ok(record) => {
                log::debug!("Fetched {url} -> {} ({} bytes)", record.path.display(), record.bytes);
                Ok(record)
            }
            Err(RetryError::NotFound) => Err(FetchError::permanent(url, "HTTP 404 Not Found")),
            Err(RetryError::Permanent(reason)) => Err(FetchError::permanent(url, reason)),
            Err(e @ RetryError::Exhausted { .. }) => Err(FetchError::exhausted(url, e)),
        }
    }
}
