use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::NaiveDate;
use crossbeam_channel::{unbounded, Sender};
use serde::Serialize;

use crate::error::{CrawlError, FetchError, FetchErrorKind};
use crate::model::{ArtifactKind, Mode};

pub const FAILURES_FILE: &str = "failures.csv";
pub const SUMMARY_FILE: &str = "summary.yaml";

#[derive(Debug, Clone, Serialize)]
pub struct FailedArtifact {
    pub kind: ArtifactKind,
    pub url: String,
    pub path: PathBuf,
    pub error: FetchErrorKind,
    pub reason: String,
}

/// Counters and failures accumulated over one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub scope: String,
    pub mode: Option<Mode>,
    pub run_date: Option<NaiveDate>,
    pub journals: usize,
    pub issues: usize,
    pub articles: usize,
    /// Artifacts resolved in scope, whatever happened to them
    pub attempted: usize,
    pub skipped_existing: usize,
    pub fetched: usize,
    pub failed: Vec<FailedArtifact>,
    /// Artifacts left alone because a stop was requested
    pub not_started: usize,
    pub skipped_pages: usize,
    pub skipped_issues: usize,
    pub gone_articles: usize,
    pub unresolved_articles: usize,
    pub missing_xml: usize,
    pub listing_errors: Vec<String>,
    pub interrupted: bool,
}

impl RunSummary {
    pub(crate) fn listing_error(&mut self, e: &CrawlError) {
        if matches!(
            e,
            CrawlError::MalformedListing { .. } | CrawlError::CatalogUnavailable { .. }
        ) {
            self.skipped_pages += 1;
        }
        self.listing_errors.push(e.to_string());
    }

    pub(crate) fn failure(
        &mut self,
        kind: ArtifactKind,
        path: &Path,
        e: FetchError,
    ) -> FailedArtifact {
        let failed = FailedArtifact {
            kind,
            url: e.url,
            path: path.to_path_buf(),
            error: e.kind,
            reason: e.reason,
        };
        self.failed.push(failed.clone());
        failed
    }

    /// True when a re-run has nothing left to pick up.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
            && self.listing_errors.is_empty()
            && self.not_started == 0
            && !self.interrupted
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} journals, {} issues, {} articles visited",
            self.journals, self.issues, self.articles
        )?;
        writeln!(
            f,
            "{} artifacts: {} fetched, {} already present, {} failed, {} not started",
            self.attempted,
            self.fetched,
            self.skipped_existing,
            self.failed.len(),
            self.not_started
        )?;
        if self.skipped_pages > 0 || self.gone_articles > 0 || self.missing_xml > 0 {
            writeln!(
                f,
                "{} listing pages skipped, {} articles gone, {} unresolved, {} without XML",
                self.skipped_pages, self.gone_articles, self.unresolved_articles, self.missing_xml
            )?;
        }
        for failed in &self.failed {
            writeln!(
                f,
                "  {:?} {} {}: {}",
                failed.error, failed.kind, failed.url, failed.reason
            )?;
        }
        if self.interrupted {
            writeln!(f, "Run interrupted, re-run to resume")?;
        }
        Ok(())
    }
}

/// Run report files under the run root: failures are appended to a CSV by a writer thread
/// as they happen, the summary is written once at the end.
pub struct RunReport {
    dir: PathBuf,
    tx_failure: Option<Sender<FailedArtifact>>,
    writer: Option<thread::JoinHandle<()>>,
}

impl RunReport {
    pub fn create(dir: &Path) -> anyhow::Result<Self> {
        fs_err::create_dir_all(dir)?;
        let file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(FAILURES_FILE))?;
        let needs_headers = file.metadata()?.len() == 0;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(needs_headers)
            .from_writer(file);

        let (tx_failure, rx_failure) = unbounded::<FailedArtifact>();
        let writer = thread::Builder::new()
            .name("report".into())
            .spawn(move || {
                for failed in rx_failure {
                    if let Err(e) = wtr.serialize(&failed) {
                        log::error!("Couldn't write failure record: {e}");
                    }
                }
                wtr.flush().ok();
            })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            tx_failure: Some(tx_failure),
            writer: Some(writer),
        })
    }

    pub fn record(&self, failed: FailedArtifact) {
        if let Some(tx) = &self.tx_failure {
            tx.send(failed).ok();
        }
    }

    /// Flushes the failure log and writes the summary.
    pub fn finish(mut self, summary: &RunSummary) -> anyhow::Result<()> {
        self.close();
        let file = fs_err::File::create(self.dir.join(SUMMARY_FILE))?;
        serde_yaml::to_writer(file, summary)?;
        Ok(())
    }

    fn close(&mut self) {
        drop(self.tx_failure.take());
        if let Some(writer) = self.writer.take() {
            writer.join().ok();
        }
    }
}

impl Drop for RunReport {
    fn drop(&mut self) {
        self.close();
    }
}
