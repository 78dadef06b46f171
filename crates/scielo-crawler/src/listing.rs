//! Shared plumbing for the platform's HTML listings: selectors, URL helpers and pagination.

use std::collections::{HashSet, VecDeque};

use futures::{stream, Stream};
use scraper::{Html, Selector};
use url::Url;

use crate::error::CrawlError;
use crate::http::{Http, RetryError};

lazy_static::lazy_static! {
    static ref PAGINATION_LINK: Selector = selector(".pagination a[href]");
}

/// Compiles a selector known to be valid.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("Invalid selector {css}: {e:?}"))
}

/// Returns the path segment that follows `marker`, e.g. `alm` in `/j/alm/grid` for `j`.
pub(crate) fn segment_after(url: &Url, marker: &str) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == marker)?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub(crate) fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Collapses runs of whitespace.
pub(crate) fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One decoded listing page.
#[derive(Debug)]
pub(crate) struct ListingPage<T> {
    pub items: Vec<T>,
    /// Other pages of the same listing linked from this one
    pub pages: Vec<Url>,
}

/// Pagination links of a listing page, restricted to the listing's own path.
pub(crate) fn pagination(html: &Html, page_url: &Url) -> Vec<Url> {
    html.select(&PAGINATION_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page_url.join(href).ok())
        .filter(|url| url.path() == page_url.path() && url.host() == page_url.host())
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .collect()
}

type Decoder<C, T> = fn(&str, &Url, &C) -> Result<ListingPage<T>, String>;

struct Pages<T> {
    queue: VecDeque<Url>,
    seen: HashSet<Url>,
    items: VecDeque<T>,
}

/// Lazily walks every page of a listing, starting at `first`.
///
/// Items come out in page order. A page that cannot be fetched or decoded produces one `Err`
/// item and the walk goes on with the remaining known pages.
pub(crate) fn paginate<'a, C, T>(
    http: &'a Http,
    first: Url,
    ctx: C,
    decode: Decoder<C, T>,
) -> impl Stream<Item = Result<T, CrawlError>> + 'a
where
    C: 'a,
    T: 'a,
{
    let state = Pages {
        seen: HashSet::from([first.clone()]),
        queue: VecDeque::from([first]),
        items: VecDeque::new(),
    };
    stream::unfold((state, ctx), move |(mut st, ctx)| async move {
        loop {
            if let Some(item) = st.items.pop_front() {
                return Some((Ok(item), (st, ctx)));
            }
            let url = st.queue.pop_front()?;
            let page = match http.text(&url).await {
                Ok(page) => page,
                Err(RetryError::NotFound) => {
                    return Some((Err(CrawlError::unavailable(&url, "not found")), (st, ctx)))
                }
                Err(e) => return Some((Err(CrawlError::unavailable(&url, e)), (st, ctx))),
            };
            match decode(&page, &url, &ctx) {
                Ok(ListingPage { items, pages }) => {
                    for next in pages {
                        if st.seen.insert(next.clone()) {
                            st.queue.push_back(next);
                        }
                    }
                    st.items.extend(items);
                }
                Err(reason) => {
                    log::warn!("Skipping listing page {url}: {reason}");
                    return Some((Err(CrawlError::malformed(&url, reason)), (st, ctx)));
                }
            }
        }
    })
}
