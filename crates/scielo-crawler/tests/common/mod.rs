#![allow(dead_code)]

use std::path::Path;

use chrono::NaiveDate;
use mockito::{Matcher, Mock, ServerGuard};
use scielo_crawler::{CrawlerConfig, RetryPolicy};

pub struct ArticleFixture {
    pub key: &'static str,
    pub langs: &'static [&'static str],
}

pub const fn article(key: &'static str, langs: &'static [&'static str]) -> ArticleFixture {
    ArticleFixture { key, langs }
}

pub fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
}

pub fn config(base_url: &str, output_dir: &Path) -> CrawlerConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    CrawlerConfig {
        base_url: base_url.to_string(),
        output_dir: output_dir.to_path_buf(),
        concurrent_downloads: 2,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            cooldown_secs: 0,
            max_cooldown_secs: 0,
        },
        respect_robots: false,
        handle_sigint: false,
        ..Default::default()
    }
}

pub fn thematic_page(subject: usize, journals: &[&str]) -> String {
    let links: String = journals
        .iter()
        .map(|code| {
            format!(
                r#"<tr><td><a class="collectionLink " href="/j/{code}/"><strong class="journalTitle">Journal {code}</strong></a></td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><div id="journals_table_body">
            <div id="heading-{subject}"><h3>Subject</h3></div>
            <div id="collapseContent-{subject}"><table>{links}</table></div>
        </div></body></html>"#
    )
}

pub fn grid_page(code: &str, issues: &[&str], pages: &[usize]) -> String {
    let links: String = issues
        .iter()
        .map(|key| format!(r#"<tr><td><a href="/j/{code}/i/{key}/">{key}</a></td></tr>"#))
        .collect();
    let pagination: String = pages
        .iter()
        .map(|n| format!(r#"<li><a href="/j/{code}/grid?page={n}">{n}</a></li>"#))
        .collect();
    format!(
        r#"<html><body><div id="issueList"><table>{links}</table></div>
            <ul class="pagination">{pagination}</ul></body></html>"#
    )
}

pub fn toc_page(code: &str, articles: &[ArticleFixture]) -> String {
    let rows: String = articles
        .iter()
        .map(|a| {
            let mut cells = format!(r#"<a href="/j/{code}/a/{}/?lang=pt">Text</a>"#, a.key);
            for lang in a.langs {
                cells.push_str(&format!(
                    r#"<a href="/j/{code}/a/{}/?format=pdf&amp;lang={lang}">PDF ({lang})</a>"#,
                    a.key
                ));
            }
            format!("<tr><td>{cells}</td></tr>")
        })
        .collect();
    format!(r#"<html><body><table class="table"><tbody>{rows}</tbody></table></body></html>"#)
}

pub fn xml_body(key: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE article PUBLIC "-//NLM//DTD JATS (Z39.96) Journal Publishing DTD v1.1 20151215//EN" "https://jats.nlm.nih.gov/publishing/1.1/JATS-journalpublishing1.dtd">
<article xmlns:xlink="http://www.w3.org/1999/xlink" article-type="research-article" dtd-version="1.1" specific-use="sps-1.9" xml:lang="pt">
  <front><article-meta><article-id pub-id-type="publisher-id">{key}</article-id></article-meta></front>
  <body><p>Texto &amp; resumo</p></body>
</article>
"#
    )
}

pub const PDF_BODY: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<<>>\nendobj\n%%EOF\n";

pub async fn mock_html(server: &mut ServerGuard, path: &str, body: String) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body(body)
        .create_async()
        .await
}

pub async fn mock_artifact(
    server: &mut ServerGuard,
    code: &str,
    key: &str,
    format: &str,
    lang: &str,
    hits: usize,
) -> Mock {
    let body = match format {
        "xml" => xml_body(key).into_bytes(),
        _ => PDF_BODY.to_vec(),
    };
    server
        .mock("GET", format!("/j/{code}/a/{key}/").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("format".into(), format.into()),
            Matcher::UrlEncoded("lang".into(), lang.into()),
        ]))
        .with_status(200)
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

/// Mocks the grid, one table of contents per issue and the XML record of every article
/// (first language listed), each artifact expected `hits` times.
pub async fn mock_journal(
    server: &mut ServerGuard,
    code: &str,
    issues: &[(&str, &[ArticleFixture])],
    hits: usize,
) -> Vec<Mock> {
    let keys: Vec<&str> = issues.iter().map(|(key, _)| *key).collect();
    let mut mocks = vec![
        mock_html(server, &format!("/j/{code}/grid"), grid_page(code, &keys, &[])).await,
    ];
    for (issue, articles) in issues {
        mocks.push(
            mock_html(
                server,
                &format!("/j/{code}/i/{issue}/"),
                toc_page(code, articles),
            )
            .await,
        );
        for a in articles.iter() {
            mocks.push(mock_artifact(server, code, a.key, "xml", a.langs[0], hits).await);
        }
    }
    mocks
}
