use std::sync::Arc;

use futures::Stream;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::CrawlError;
use crate::http::Http;
use crate::listing::{self, ListingPage};
use crate::model::{Article, Issue, Journal, Rendition};

lazy_static::lazy_static! {
    static ref ISSUE_LIST: Selector = listing::selector("#issueList");
    static ref LINK: Selector = listing::selector("a[href]");
    static ref TOC_TABLE: Selector = listing::selector("table.table");
    static ref TOC_ROW: Selector = listing::selector("tbody tr");
}

/// Enumerates the issues of a journal and the articles of an issue.
///
/// Sequences are lazy and re-query the platform on every call.
pub struct HierarchyWalker {
    http: Arc<Http>,
}

impl HierarchyWalker {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Issues of `journal` from its issue grid, each `Err` being one skipped page.
    pub fn list_issues(
        &self,
        journal: Arc<Journal>,
    ) -> impl Stream<Item = Result<Issue, CrawlError>> + '_ {
        let path = format!("/j/{}/grid", journal.code);
        let first = self.http.url(&path);
        let walk = first
            .map(|first| listing::paginate(&self.http, first, journal, decode_grid))
            .map_err(|e| CrawlError::unavailable(&path, e));
        flatten(walk)
    }

    /// Articles of `issue` from its table of contents, each `Err` being one skipped page.
    pub fn list_articles(
        &self,
        issue: Arc<Issue>,
    ) -> impl Stream<Item = Result<Article, CrawlError>> + '_ {
        let first = issue.url.clone();
        listing::paginate(&self.http, first, issue, decode_toc)
    }
}

/// Turns a failed listing setup into a one-error stream.
fn flatten<S, T>(walk: Result<S, CrawlError>) -> impl Stream<Item = Result<T, CrawlError>>
where
    S: Stream<Item = Result<T, CrawlError>>,
{
    use futures::stream::{self, StreamExt};

    match walk {
        Ok(s) => s.left_stream(),
        Err(e) => stream::once(async move { Err(e) }).right_stream(),
    }
}

pub(crate) fn decode_grid(
    page: &str,
    page_url: &Url,
    journal: &Arc<Journal>,
) -> Result<ListingPage<Issue>, String> {
    let html = Html::parse_document(page);
    let issue_list = html
        .select(&ISSUE_LIST)
        .next()
        .ok_or("missing #issueList")?;

    let mut items: Vec<Issue> = vec![];
    for href in issue_list.select(&LINK).filter_map(|a| a.value().attr("href")) {
        let Ok(url) = page_url.join(href) else {
            continue;
        };
        let Some(key) = listing::segment_after(&url, "i") else {
            continue;
        };
        if items.iter().any(|i| i.key == key) {
            continue;
        }
        items.push(Issue {
            journal: journal.clone(),
            key,
            url: without_query(url),
        });
    }

    Ok(ListingPage {
        items,
        pages: listing::pagination(&html, page_url),
    })
}

pub(crate) fn decode_toc(
    page: &str,
    page_url: &Url,
    issue: &Arc<Issue>,
) -> Result<ListingPage<Article>, String> {
    let html = Html::parse_document(page);
    let table = html.select(&TOC_TABLE).next().ok_or("missing table.table")?;

    let mut items: Vec<Article> = vec![];
    for row in table.select(&TOC_ROW) {
        for (key, landing, rendition) in row_links(row, page_url)? {
            let idx = match items.iter().position(|a| a.key == key) {
                Some(idx) => idx,
                None => {
                    items.push(Article {
                        issue: issue.clone(),
                        key,
                        url: landing,
                        renditions: vec![],
                    });
                    items.len() - 1
                }
            };
            if let Some(rendition) = rendition {
                let renditions = &mut items[idx].renditions;
                if !renditions.iter().any(|r| r.lang == rendition.lang) {
                    renditions.push(rendition);
                }
            }
        }
    }

    Ok(ListingPage {
        items,
        pages: listing::pagination(&html, page_url),
    })
}

/// Article links of one table row: `(article key, landing page, pdf rendition)`.
///
/// A `format=pdf` link that does not name its article makes the whole page invalid.
fn row_links(
    row: ElementRef<'_>,
    page_url: &Url,
) -> Result<Vec<(String, Url, Option<Rendition>)>, String> {
    let mut links = vec![];
    for href in row.select(&LINK).filter_map(|a| a.value().attr("href")) {
        let Ok(url) = page_url.join(href) else {
            continue;
        };
        let is_pdf = listing::query_value(&url, "format").as_deref() == Some("pdf");
        let key = match listing::segment_after(&url, "a") {
            Some(key) => key,
            None if is_pdf => return Err(format!("pdf link without article key: {href}")),
            None => continue,
        };
        let landing = without_query(url.clone());
        let rendition = is_pdf.then(|| Rendition {
            lang: listing::query_value(&url, "lang").unwrap_or_else(|| "xx".into()),
            pdf_url: url,
        });
        links.push((key, landing, rendition));
    }
    Ok(links)
}

pub(crate) fn decode_landing(page: &str, page_url: &Url) -> Vec<Rendition> {
    let html = Html::parse_document(page);
    let mut renditions: Vec<Rendition> = vec![];
    for href in html.select(&LINK).filter_map(|a| a.value().attr("href")) {
        let Ok(url) = page_url.join(href) else {
            continue;
        };
        if listing::query_value(&url, "format").as_deref() != Some("pdf") {
            continue;
        }
        let lang = listing::query_value(&url, "lang").unwrap_or_else(|| "xx".into());
        if !renditions.iter().any(|r| r.lang == lang) {
            renditions.push(Rendition { lang, pdf_url: url });
        }
    }
    renditions
}

fn without_query(mut url: Url) -> Url {
    url.set_query(None);
    url.set_fragment(None);
    url
}
