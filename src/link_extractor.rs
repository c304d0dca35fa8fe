//! Turns a search query into an ordered, deduplicated list of place URLs by
//! scrolling the results panel until it stops growing.

use std::collections::HashSet;

use log::{info, warn};

use crate::error::ExtractResult;
use crate::models::normalize_place_link;
use crate::page::SearchPage;
use crate::scroller::{ScrollPolicy, StagnationScroller};

pub struct LinkExtractor {
    scroller: StagnationScroller,
}

impl LinkExtractor {
    pub fn new(policy: ScrollPolicy) -> Self {
        LinkExtractor {
            scroller: StagnationScroller::new(policy),
        }
    }

    /// Zero results is not an error here: an empty list comes back and the
    /// caller decides whether that is fatal.
    pub fn collect(&self, page: &mut dyn SearchPage, query: &str) -> ExtractResult<Vec<String>> {
        page.open_search(query)?;

        let outcome = self.scroller.run(page)?;
        if outcome.possibly_incomplete {
            warn!(
                "Results panel was still growing at the scroll cap; link list for '{}' may be partial",
                query
            );
        }

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for href in page.visible_links()? {
            if let Some(url) = normalize_place_link(&href) {
                if seen.insert(url.clone()) {
                    links.push(url);
                }
            }
        }

        info!("Collected {} unique place links for '{}'", links.len(), query);
        Ok(links)
    }
}
