use std::sync::Arc;

use crate::error::CrawlError;
use crate::http::{Http, RetryError};
use crate::model::{Article, Artifact, ArtifactKind, Mode, Rendition};
use crate::walker;

/// Expands an article into the artifacts to synchronize for a given [`Mode`].
pub struct ArtifactResolver {
    http: Arc<Http>,
    preferred_languages: Vec<String>,
}

impl ArtifactResolver {
    pub fn new(http: Arc<Http>, preferred_languages: Vec<String>) -> Self {
        Self {
            http,
            preferred_languages,
        }
    }

    /// Artifacts of `article`: its XML record, plus every PDF rendition for
    /// [`Mode::XmlAndPdf`]. An article without any rendition resolves to nothing.
    pub async fn resolve(&self, article: &Article, mode: Mode) -> Result<Vec<Artifact>, CrawlError> {
        let renditions = if article.renditions.is_empty() {
            self.discover(article).await?
        } else {
            article.renditions.clone()
        };

        let Some(xml) = self.pick_xml(&renditions) else {
            log::warn!(
                "MissingXML: no XML record for article {} of {}/{}",
                article.key,
                article.journal_code(),
                article.issue.key
            );
            return Ok(vec![]);
        };

        let mut artifacts = vec![self.artifact(article, ArtifactKind::Xml, xml)];
        if mode == Mode::XmlAndPdf {
            artifacts.extend(
                renditions
                    .iter()
                    .map(|r| self.artifact(article, ArtifactKind::Pdf, r)),
            );
        }
        Ok(artifacts)
    }

    /// Reads the renditions off the article landing page.
    async fn discover(&self, article: &Article) -> Result<Vec<Rendition>, CrawlError> {
        log::debug!("Resolving renditions of {} from its landing page", article.key);
        match self.http.text(&article.url).await {
            Ok(page) => Ok(walker::decode_landing(&page, &article.url)),
            Err(RetryError::NotFound) => Err(CrawlError::ArticleGone {
                url: article.url.to_string(),
            }),
            Err(e) => Err(CrawlError::ResolverTransport {
                url: article.url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// One XML record per article: first preferred language available, else the
    /// alphabetically first one.
    fn pick_xml<'a>(&self, renditions: &'a [Rendition]) -> Option<&'a Rendition> {
        self.preferred_languages
            .iter()
            .find_map(|lang| renditions.iter().find(|r| &r.lang == lang))
            .or_else(|| renditions.iter().min_by(|a, b| a.lang.cmp(&b.lang)))
    }

    fn artifact(&self, article: &Article, kind: ArtifactKind, rendition: &Rendition) -> Artifact {
        let url = match kind {
            ArtifactKind::Xml => rendition.xml_url(),
            ArtifactKind::Pdf => rendition.pdf_url.clone(),
        };
        Artifact {
            kind,
            url,
            journal: article.journal_code().to_string(),
            issue: article.issue.key.clone(),
            article: article.key.clone(),
            lang: rendition.lang.clone(),
        }
    }
}
