use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

/// A periodical, addressed by its platform code (`alm`, `rbh`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Journal {
    pub code: String,
    pub title: Option<String>,
}

impl Journal {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: None,
        }
    }
}

impl fmt::Display for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{} ({})", title, self.code),
            None => write!(f, "{}", self.code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub journal: Arc<Journal>,
    /// Platform issue key, e.g. `2015.v18n1`
    pub key: String,
    pub url: Url,
}

impl Issue {
    /// Publication year encoded in the leading digits of the key.
    pub fn year(&self) -> Option<i32> {
        let digits = self.key.get(..4)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = digits.parse().ok()?;
        (1900..2100).contains(&year).then_some(year)
    }
}

/// One language version of an article, as linked from a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub lang: String,
    pub pdf_url: Url,
}

impl Rendition {
    /// The XML record lives next to the PDF, selected by the `format` query parameter.
    pub fn xml_url(&self) -> Url {
        let mut url = self.pdf_url.clone();
        let pairs: Vec<(String, String)> = self
            .pdf_url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "format" { "xml".into() } else { v };
                (k.into_owned(), v.into_owned())
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub issue: Arc<Issue>,
    /// Platform article key, e.g. `ZQ4kWRYBtjJ3XcwhmRJ3s7w`
    pub key: String,
    /// Landing page, used when the listing carried no rendition links
    pub url: Url,
    pub renditions: Vec<Rendition>,
}

impl Article {
    pub fn journal_code(&self) -> &str {
        &self.issue.journal.code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArtifactKind {
    #[serde(rename = "XML")]
    Xml,
    #[serde(rename = "PDF")]
    Pdf,
}

impl ArtifactKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Xml => "XML",
            Self::Pdf => "PDF",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A downloadable unit of an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub url: Url,
    pub journal: String,
    pub issue: String,
    pub article: String,
    pub lang: String,
}

/// Which artifacts of each article are synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Mode {
    /// XML metadata records only
    XmlOnly,
    /// XML metadata records and every PDF rendition
    XmlAndPdf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(key: &str) -> Issue {
        Issue {
            journal: Arc::new(Journal::new("alm")),
            key: key.into(),
            url: Url::parse("https://www.scielo.br/j/alm/i/x/").unwrap(),
        }
    }

    #[test]
    fn issue_year_from_key() {
        assert_eq!(issue("2015.v18n1").year(), Some(2015));
        assert_eq!(issue("1998.v1n2").year(), Some(1998));
        assert_eq!(issue("v18n1").year(), None);
        assert_eq!(issue("20").year(), None);
    }

    #[test]
    fn xml_url_keeps_language() {
        let rendition = Rendition {
            lang: "en".into(),
            pdf_url: Url::parse("https://www.scielo.br/j/alm/a/AbC123/?format=pdf&lang=en")
                .unwrap(),
        };
        assert_eq!(
            rendition.xml_url().as_str(),
            "https://www.scielo.br/j/alm/a/AbC123/?format=xml&lang=en"
        );
    }
}
