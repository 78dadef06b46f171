use std::collections::HashSet;
use std::fmt;
use std::mem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};
use futures::{pin_mut, stream, StreamExt};

use crate::catalog::{CatalogIndex, Subject};
use crate::config::CrawlerConfig;
use crate::error::CrawlError;
use crate::fetch::FetchExecutor;
use crate::http::Http;
use crate::model::{Artifact, Issue, Journal, Mode};
use crate::report::{RunReport, RunSummary};
use crate::resolver::ArtifactResolver;
use crate::store::{DownloadRecord, LocalStore};
use crate::walker::HierarchyWalker;

/// Artifacts queued per download worker before fetching starts, so a long issue does not
/// have to be listed in full before its first download.
const FETCH_BATCH_PER_WORKER: usize = 4;

/// What a run covers: every journal of a subject, or an explicit list of journal codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Subject(Subject),
    Journals(Vec<String>),
}

impl Scope {
    /// Parses a subject given by number, name or slug.
    pub fn subject(s: &str) -> Result<Self, CrawlError> {
        Ok(Self::Subject(s.parse()?))
    }

    pub fn journals<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Journals(
            codes
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject(subject) => write!(f, "{subject}"),
            Self::Journals(codes) => write!(f, "journals {}", codes.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Journal,
    Issue,
    Article,
}

/// Where the orchestrator currently is in its traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Traversing(Level),
    Resolving,
    Filtering,
    Fetching,
    Done,
}

/// Cooperative stop: in-flight fetches complete, nothing new is started.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            log::warn!("Stop requested, finishing in-flight downloads");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum TaskOutcome {
    Fetched(DownloadRecord),
    Failed(Artifact, PathBuf, crate::error::FetchError),
    NotStarted,
}

/// Drives journals -> issues -> articles -> artifacts for one scope and mode.
pub struct SyncOrchestrator {
    config: CrawlerConfig,
    http: Arc<Http>,
    store: LocalStore,
    catalog: CatalogIndex,
    walker: HierarchyWalker,
    resolver: ArtifactResolver,
    fetcher: FetchExecutor,
    stop: StopHandle,
    phase: Mutex<Phase>,
}

impl SyncOrchestrator {
    /// Fixes the run date to today.
    pub fn new(config: CrawlerConfig) -> anyhow::Result<Self> {
        Self::with_run_date(config, Local::now().date_naive())
    }

    pub fn with_run_date(config: CrawlerConfig, run_date: NaiveDate) -> anyhow::Result<Self> {
        let http = Arc::new(Http::new(&config)?);
        let store = LocalStore::new(&config.output_dir, run_date, config.verify_content);
        Ok(Self {
            catalog: CatalogIndex::new(http.clone()),
            walker: HierarchyWalker::new(http.clone()),
            resolver: ArtifactResolver::new(http.clone(), config.preferred_languages.clone()),
            fetcher: FetchExecutor::new(http.clone(), store.clone()),
            http,
            store,
            config,
            stop: StopHandle::default(),
            phase: Mutex::new(Phase::Idle),
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, phase: Phase) {
        let mut current = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if *current != phase {
            log::trace!("{:?} -> {:?}", *current, phase);
            *current = phase;
        }
    }

    /// Synchronizes `scope`. Listing, resolution and fetch failures are skipped and
    /// summarized; only local setup failures (report files) end the run early.
    pub async fn run(&self, scope: &Scope, mode: Mode) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary {
            scope: scope.to_string(),
            mode: Some(mode),
            run_date: Some(self.store.run_date()),
            ..Default::default()
        };
        let report = if self.config.write_report {
            Some(RunReport::create(self.store.run_root())?)
        } else {
            None
        };
        log::info!(
            "Synchronizing {scope} ({mode:?}) into {}",
            self.store.run_root().display()
        );

        let sigint = self.config.handle_sigint.then(|| {
            let stop = self.stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.stop();
                }
            })
        });

        if self.config.respect_robots {
            self.http.load_robots().await;
        }

        self.enter(Phase::Traversing(Level::Journal));
        let journals = match scope {
            Scope::Subject(subject) => match self.catalog.list_journals(*subject).await {
                Ok(journals) => journals,
                Err(e) => {
                    log::error!("{e}");
                    summary.listing_error(&e);
                    vec![]
                }
            },
            Scope::Journals(codes) => codes.iter().map(Journal::new).collect(),
        };

        for journal in journals {
            if self.stop.is_stopped() {
                break;
            }
            summary.journals += 1;
            self.sync_journal(Arc::new(journal), mode, &mut summary, report.as_ref())
                .await;
        }

        if let Some(sigint) = sigint {
            sigint.abort();
        }
        summary.interrupted = self.stop.is_stopped();
        self.enter(Phase::Done);
        if let Some(report) = report {
            report.finish(&summary)?;
        }
        log::info!(
            "Done: {} fetched, {} already present, {} failed",
            summary.fetched,
            summary.skipped_existing,
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn sync_journal(
        &self,
        journal: Arc<Journal>,
        mode: Mode,
        summary: &mut RunSummary,
        report: Option<&RunReport>,
    ) {
        log::info!("Journal {journal}");
        self.enter(Phase::Traversing(Level::Issue));
        let issues = self.walker.list_issues(journal.clone());
        pin_mut!(issues);
        loop {
            if self.stop.is_stopped() {
                return;
            }
            let Some(issue) = issues.next().await else {
                return;
            };
            match issue {
                Ok(issue) if self.accept_issue(&issue) => {
                    summary.issues += 1;
                    self.sync_issue(Arc::new(issue), mode, summary, report).await;
                    self.enter(Phase::Traversing(Level::Issue));
                }
                Ok(_) => summary.skipped_issues += 1,
                Err(e) => summary.listing_error(&e),
            }
        }
    }

    fn accept_issue(&self, issue: &Issue) -> bool {
        let Some(min_year) = self.config.min_year else {
            return true;
        };
        match issue.year() {
            Some(year) => year >= min_year,
            None => {
                log::warn!("Ignoring issue without year: {}", issue.url);
                false
            }
        }
    }

    async fn sync_issue(
        &self,
        issue: Arc<Issue>,
        mode: Mode,
        summary: &mut RunSummary,
        report: Option<&RunReport>,
    ) {
        log::info!("Issue {}/{}", issue.journal.code, issue.key);
        let batch = self.config.effective_concurrency() * FETCH_BATCH_PER_WORKER;
        let mut pending: Vec<(Artifact, PathBuf)> = vec![];
        let mut queued: HashSet<PathBuf> = HashSet::new();

        self.enter(Phase::Traversing(Level::Article));
        let articles = self.walker.list_articles(issue.clone());
        pin_mut!(articles);
        loop {
            if self.stop.is_stopped() {
                break;
            }
            let Some(article) = articles.next().await else {
                break;
            };
            let article = match article {
                Ok(article) => article,
                Err(e) => {
                    summary.listing_error(&e);
                    continue;
                }
            };
            summary.articles += 1;

            self.enter(Phase::Resolving);
            let artifacts = match self.resolver.resolve(&article, mode).await {
                Ok(artifacts) => artifacts,
                Err(e @ CrawlError::ArticleGone { .. }) => {
                    log::warn!("Skipping: {e}");
                    summary.gone_articles += 1;
                    continue;
                }
                Err(e) => {
                    log::warn!("Skipping: {e}");
                    summary.unresolved_articles += 1;
                    summary.listing_errors.push(e.to_string());
                    continue;
                }
            };
            if artifacts.is_empty() {
                summary.missing_xml += 1;
            }

            self.enter(Phase::Filtering);
            for artifact in artifacts {
                summary.attempted += 1;
                let path = self.store.path_for(&artifact);
                if self.store.exists(&path) {
                    log::debug!("Already present: {}", path.display());
                    summary.skipped_existing += 1;
                } else if queued.insert(path.clone()) {
                    pending.push((artifact, path));
                } else {
                    summary.skipped_existing += 1;
                }
            }

            if pending.len() >= batch {
                self.fetch_all(mem::take(&mut pending), summary, report).await;
            }
            self.enter(Phase::Traversing(Level::Article));
        }

        self.fetch_all(pending, summary, report).await;
    }

    /// Downloads `pending` in traversal order through the bounded pool. Once a stop is
    /// requested, tasks not yet started are counted and dropped.
    async fn fetch_all(
        &self,
        pending: Vec<(Artifact, PathBuf)>,
        summary: &mut RunSummary,
        report: Option<&RunReport>,
    ) {
        if pending.is_empty() {
            return;
        }
        self.enter(Phase::Fetching);
        let outcomes = stream::iter(pending)
            .map(|(artifact, path)| async move {
                if self.stop.is_stopped() {
                    return TaskOutcome::NotStarted;
                }
                log::debug!("Fetching {}", artifact.url);
                match self.fetcher.fetch(&artifact).await {
                    Ok(record) => TaskOutcome::Fetched(record),
                    Err(e) => TaskOutcome::Failed(artifact, path, e),
                }
            })
            .buffer_unordered(self.config.effective_concurrency());
        pin_mut!(outcomes);
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                TaskOutcome::Fetched(_) => summary.fetched += 1,
                TaskOutcome::NotStarted => summary.not_started += 1,
                TaskOutcome::Failed(artifact, path, e) => {
                    log::warn!("{e}");
                    let failed = summary.failure(artifact.kind, &path, e);
                    if let Some(report) = report {
                        report.record(failed);
                    }
                }
            }
        }
    }
}
