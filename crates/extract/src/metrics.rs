//! Repository page metrics.
//!
//! The numbers live in page markup with no stable API behind them, so the
//! scraping strategy sits behind [`PageMetricsExtractor`] and can be swapped
//! without touching the enrichment loop.

use crate::consts;
use crate::error::{ErrorKind, Result};
use crate::number::text_to_number;
use exn::OptionExt;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub contributors: u64,
    pub commits: u64,
}

/// Pulls [`PageMetrics`] out of a repository's public page.
pub trait PageMetricsExtractor: Send + Sync {
    /// `repo` is `owner/name`; `branch` is the default branch the commit
    /// counter links to.
    fn extract(&self, html: &str, repo: &str, branch: &str) -> Result<PageMetrics>;
}

/// Extractor for the github.com repository page layout.
///
/// - Contributors come from the `.Counter` inside the contributors graph
///   link. When that shows an overflow (`5,000+`), the second such link holds
///   the full figure. Anything unreadable counts as one contributor.
/// - Commits come from `span > strong` inside the link to the default
///   branch's history, and are required.
#[derive(Debug, Clone, Copy, Default)]
pub struct GithubPageExtractor;

impl PageMetricsExtractor for GithubPageExtractor {
    #[instrument(level = "debug", skip(self, html), fields(html_size = html.len()))]
    fn extract(&self, html: &str, repo: &str, branch: &str) -> Result<PageMetrics> {
        let page = RepositoryPage::from_html(html);
        let commits = page.commits(repo, branch)?;
        let contributors = page.contributors(repo);
        Ok(PageMetrics { contributors, commits })
    }
}

struct RepositoryPage {
    document: Html,
}

impl RepositoryPage {
    fn from_html(html: &str) -> Self {
        Self { document: Html::parse_document(html) }
    }

    fn links_to<'a>(&'a self, href: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.document.select(&consts::ANCHOR_SELECTOR).filter(move |a| a.value().attr("href") == Some(href))
    }

    fn contributors(&self, repo: &str) -> u64 {
        let href = format!("/{repo}/graphs/contributors");
        let mut links = self.links_to(&href);
        let counter = links
            .next()
            .and_then(|link| link.select(&consts::COUNTER_SELECTOR).next())
            .map(|counter| text_of(&counter))
            .filter(|text| !text.is_empty());
        let Some(counter) = counter else {
            tracing::warn!(repo, "Could not find contributors, assuming 1");
            return 1;
        };
        let count = if counter.contains('+') {
            links
                .next()
                .map(|link| text_of(&link))
                .and_then(|text| consts::GROUPED_DIGITS_REGEX.find(&text).map(|m| m.as_str().to_string()))
                .and_then(|digits| text_to_number(&digits))
        } else {
            text_to_number(&counter)
        };
        match count {
            Some(count) => count.max(1),
            None => {
                tracing::warn!(repo, counter = %counter, "Unreadable contributor count, assuming 1");
                1
            },
        }
    }

    fn commits(&self, repo: &str, branch: &str) -> Result<u64> {
        let href = format!("/{repo}/commits/{branch}");
        let text = self
            .links_to(&href)
            .find_map(|link| child(link, "span").and_then(|span| child(span, "strong")))
            .map(|strong| text_of(&strong))
            .ok_or_raise(|| ErrorKind::MissingField("commits"))?;
        text_to_number(&text).ok_or_raise(|| ErrorKind::ParseError { field: "commits", value: text.clone() })
    }
}

/// First direct child element named `name`.
fn child<'a>(parent: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    parent.children().filter_map(ElementRef::wrap).find(|element| element.value().name() == name)
}

fn text_of(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
