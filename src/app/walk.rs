use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};
use url::Url;

use super::error::Result;
use super::fetch::{PageSource, absolutize};
use super::types::{CatalogStub, ScrapeConfig};

const PRODUCT_ROW_SELECTOR: &str = "tr[data-entity-id]";
const PRODUCT_LINK_SELECTOR: &str = "td.custom__table-heading__title a";

pub fn parse_listing(markup: &str, base: &Url) -> Vec<CatalogStub> {
    let doc = Html::parse_document(markup);
    let (row_sel, link_sel) = match (
        Selector::parse(PRODUCT_ROW_SELECTOR),
        Selector::parse(PRODUCT_LINK_SELECTOR),
    ) {
        (Ok(row), Ok(link)) => (row, link),
        _ => return Vec::new(),
    };

    let mut out = Vec::new();
    for row in doc.select(&row_sel) {
        let Some(link) = row.select(&link_sel).next() else {
            debug!("listing row without a title link, skipped");
            continue;
        };
        let Some(href) = link
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            debug!("listing row link without href, skipped");
            continue;
        };
        let url = match absolutize(base, href) {
            Ok(url) => url,
            Err(err) => {
                debug!(href, error = %err, "listing row link could not be resolved, skipped");
                continue;
            }
        };
        out.push(CatalogStub {
            name: link.text().collect::<String>().trim().to_string(),
            url,
        });
    }
    out
}

pub struct CatalogWalker<S> {
    source: S,
    base: Url,
    listing: Url,
    pages: usize,
    page_size: usize,
}

impl<S: PageSource> CatalogWalker<S> {
    pub fn new(source: S, config: &ScrapeConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        let listing = base.join(&config.listing_path)?;
        Ok(Self {
            source,
            base,
            listing,
            pages: config.pages,
            page_size: config.page_size.max(1),
        })
    }

    pub fn page_url(&self, page: usize) -> String {
        let mut url = self.listing.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("start", &page.saturating_mul(self.page_size).to_string())
            .append_pair("type", "1")
            .append_pair("type", "1");
        url.to_string()
    }

    pub async fn walk(&self) -> Vec<CatalogStub> {
        let mut stubs = Vec::new();
        for page in 0..self.pages {
            let page_number = page + 1;
            let url = self.page_url(page);
            info!(page = page_number, %url, "fetching listing page");

            let markup = match self.source.fetch_text(&url).await {
                Ok(markup) => markup,
                Err(err) => {
                    error!(page = page_number, %url, error = %err, "listing page failed, skipped");
                    continue;
                }
            };

            let found = parse_listing(&markup, &self.base);
            if found.is_empty() {
                warn!(page = page_number, "no product rows found");
                continue;
            }
            info!(page = page_number, rows = found.len(), "found product rows");
            stubs.extend(found);
        }
        stubs
    }
}
