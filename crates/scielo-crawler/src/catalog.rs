use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use crate::error::CrawlError;
use crate::http::Http;
use crate::listing;
use crate::model::Journal;

pub const THEMATIC_PATH: &str = "/journals/thematic?status=current&lang=pt";

/// The eight thematic areas journals are grouped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Subject {
    AgrarianSciences,
    BiologicalSciences,
    HealthSciences,
    ExactAndEarthSciences,
    HumanSciences,
    AppliedSocialSciences,
    Engineering,
    LinguisticsLettersAndArts,
}

impl Subject {
    pub const ALL: [Subject; 8] = [
        Self::AgrarianSciences,
        Self::BiologicalSciences,
        Self::HealthSciences,
        Self::ExactAndEarthSciences,
        Self::HumanSciences,
        Self::AppliedSocialSciences,
        Self::Engineering,
        Self::LinguisticsLettersAndArts,
    ];

    /// Position of the area on the thematic page, 1-based.
    pub fn number(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .map(|i| i + 1)
            .unwrap_or_default()
    }

    /// Portuguese name, as displayed by the platform.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AgrarianSciences => "Ciências Agrárias",
            Self::BiologicalSciences => "Ciências Biológicas",
            Self::HealthSciences => "Ciências da Saúde",
            Self::ExactAndEarthSciences => "Ciências Exatas e da Terra",
            Self::HumanSciences => "Ciências Humanas",
            Self::AppliedSocialSciences => "Ciências Sociais Aplicadas",
            Self::Engineering => "Engenharias",
            Self::LinguisticsLettersAndArts => "Linguística, Letras e Artes",
        }
    }

    pub fn slug(&self) -> String {
        fold(self.name())
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subject {
    type Err = CrawlError;

    /// Accepts the area number, its name (case and accents ignored) or its slug.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            return n
                .checked_sub(1)
                .and_then(|i| Self::ALL.get(i))
                .copied()
                .ok_or_else(|| CrawlError::InvalidSubject(s.to_string()));
        }
        let wanted = fold(s);
        Self::ALL
            .iter()
            .find(|subject| fold(subject.name()) == wanted || subject.slug() == wanted)
            .copied()
            .ok_or_else(|| CrawlError::InvalidSubject(s.to_string()))
    }
}

/// Lowercases and strips the diacritics found in the area names.
fn fold(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'a',
            'é' | 'ê' | 'É' | 'Ê' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'o',
            'ú' | 'ü' | 'Ú' | 'Ü' => 'u',
            'ç' | 'Ç' => 'c',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

lazy_static::lazy_static! {
    static ref TABLE_BODY: Selector = listing::selector("#journals_table_body");
    static ref JOURNAL_LINK: Selector = listing::selector("a.collectionLink");
    static ref JOURNAL_TITLE: Selector = listing::selector(".journalTitle");
}

/// Maps a subject to the journals published under it, from the platform's thematic page.
pub struct CatalogIndex {
    http: Arc<Http>,
}

impl CatalogIndex {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Lists the journals of `subject`, in page order. Failures are not retried here.
    pub async fn list_journals(&self, subject: Subject) -> Result<Vec<Journal>, CrawlError> {
        let url = self
            .http
            .url(THEMATIC_PATH)
            .map_err(|e| CrawlError::unavailable(THEMATIC_PATH, e))?;
        let resp = self
            .http
            .get(&url)
            .await
            .map_err(|e| CrawlError::unavailable(&url, e))?;
        let page = resp
            .text()
            .await
            .map_err(|e| CrawlError::unavailable(&url, e))?;
        let journals = decode_thematic(&page, &url, subject)
            .map_err(|reason| CrawlError::unavailable(&url, reason))?;
        log::info!("{subject}: {} journals", journals.len());
        Ok(journals)
    }
}

pub(crate) fn decode_thematic(
    page: &str,
    page_url: &Url,
    subject: Subject,
) -> Result<Vec<Journal>, String> {
    let html = Html::parse_document(page);
    let body = html
        .select(&TABLE_BODY)
        .next()
        .ok_or("missing #journals_table_body")?;
    let section_sel = listing::selector(&format!("#collapseContent-{}", subject.number()));
    let section = body
        .select(&section_sel)
        .next()
        .ok_or_else(|| format!("missing section for subject {}", subject.number()))?;

    let mut journals: Vec<Journal> = vec![];
    for link in section.select(&JOURNAL_LINK) {
        let href = link
            .value()
            .attr("href")
            .ok_or("journal link without href")?;
        let url = page_url
            .join(href)
            .map_err(|e| format!("bad journal link {href}: {e}"))?;
        let code = listing::segment_after(&url, "j")
            .ok_or_else(|| format!("no journal code in {href}"))?;
        if journals.iter().any(|j| j.code == code) {
            continue;
        }
        let title = link
            .select(&JOURNAL_TITLE)
            .next()
            .map(|t| listing::squash(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty());
        journals.push(Journal { code, title });
    }
    Ok(journals)
}
