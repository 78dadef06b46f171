use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use futures::{Stream, StreamExt};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::model::{Artifact, ArtifactKind};

pub const ROOT_DIR: &str = "scielo";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The byte stream broke off before its end
    #[error("transfer interrupted: {0}")]
    Interrupted(String),
    /// The body is not a valid artifact of its kind
    #[error("invalid content: {0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A verified-complete artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Owns the `scielo/{date}/{KIND}/{journal}/{issue}/` layout.
///
/// The filesystem is the only state: a file at its final path is always complete, because
/// bodies are written to a sibling temporary file and renamed into place once validated.
#[derive(Debug, Clone)]
pub struct LocalStore {
    run_root: PathBuf,
    run_date: NaiveDate,
    verify_content: bool,
}

impl LocalStore {
    pub fn new(output_dir: impl AsRef<Path>, run_date: NaiveDate, verify_content: bool) -> Self {
        let run_root = output_dir
            .as_ref()
            .join(ROOT_DIR)
            .join(run_date.format("%Y-%m-%d").to_string());
        Self {
            run_root,
            run_date,
            verify_content,
        }
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
    }

    /// `{output}/scielo/{date}`
    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
        let file_name = match artifact.kind {
            ArtifactKind::Xml => format!("{}.xml", sanitize(&artifact.article)),
            ArtifactKind::Pdf => format!(
                "{}-{}.pdf",
                sanitize(&artifact.article),
                sanitize(&artifact.lang)
            ),
        };
        self.run_root
            .join(artifact.kind.dir_name())
            .join(sanitize(&artifact.journal))
            .join(sanitize(&artifact.issue))
            .join(file_name)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Streams `body` into `path`. On any error nothing is left at `path`.
    pub async fn write<S, B, E>(
        &self,
        path: &Path,
        kind: ArtifactKind,
        body: S,
    ) -> Result<DownloadRecord, StoreError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Invalid(format!("no parent for {}", path.display())))?;
        fs_err::create_dir_all(dir)?;

        let prefix = format!(
            ".{}.",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        // Removed on drop unless persisted.
        let tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(dir)?;

        let mut file = tokio::fs::File::from_std(tmp.reopen()?);
        let mut bytes = 0u64;
        futures::pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StoreError::Interrupted(e.to_string()))?;
            let chunk = chunk.as_ref();
            file.write_all(chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if self.verify_content {
            verify(tmp.path(), kind)?;
        }

        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(DownloadRecord {
            kind,
            path: path.to_path_buf(),
            bytes,
        })
    }
}

/// Keeps `[A-Za-z0-9._-]`, anything else becomes `_`.
fn sanitize(segment: &str) -> String {
    let clean: String = segment
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    match clean.as_str() {
        "" | "." | ".." => "_".into(),
        _ => clean,
    }
}

fn verify(path: &Path, kind: ArtifactKind) -> Result<(), StoreError> {
    match kind {
        ArtifactKind::Pdf => {
            let mut magic = [0u8; 5];
            let mut file = fs_err::File::open(path)?;
            let n = file.read(&mut magic)?;
            if n < magic.len() || &magic != b"%PDF-" {
                return Err(StoreError::Invalid("not a PDF document".into()));
            }
        }
        ArtifactKind::Xml => check_xml(path)?,
    }
    Ok(())
}

/// Well-formedness scan: balanced elements under a single root, no stray text outside it.
/// Declarations such as the JATS `<!DOCTYPE article PUBLIC ...>` are accepted, not resolved.
fn check_xml(path: &Path) -> Result<(), StoreError> {
    let file = fs_err::File::open(path)?;
    let mut xml = Reader::from_reader(io::BufReader::new(file));
    xml.config_mut().check_end_names = true;

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut roots = 0usize;
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Ok(Event::Empty(_)) if depth == 0 => roots += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Text(ref t)) if depth == 0 => {
                let raw: &[u8] = t;
                let raw = raw.strip_prefix(b"\xef\xbb\xbf").unwrap_or(raw);
                if raw.iter().any(|b| !b.is_ascii_whitespace()) {
                    return Err(StoreError::Invalid("text outside the root element".into()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(StoreError::Invalid(format!(
                    "not well-formed XML at byte {}: {e}",
                    xml.buffer_position()
                )))
            }
        }
        buf.clear();
    }

    match (depth, roots) {
        (0, 1) => Ok(()),
        (0, 0) => Err(StoreError::Invalid("no root element".into())),
        (0, _) => Err(StoreError::Invalid("several root elements".into())),
        _ => Err(StoreError::Invalid("unclosed element at end of document".into())),
    }
}
