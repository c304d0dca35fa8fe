//! One place link in, one `Place` record out: metadata once, review feed
//! scrolled to stagnation, visible cards deduplicated.

use log::debug;

use crate::error::ExtractResult;
use crate::models::Place;
use crate::page::PlacePage;
use crate::scroller::{ScrollPolicy, StagnationScroller};

#[derive(Debug, Clone)]
pub struct PlaceExtraction {
    pub place: Place,
    /// Set when the review feed hit the scroll cap instead of stagnating.
    /// Such results are accepted as final, not silently reprocessed later.
    pub possibly_incomplete: bool,
}

pub struct PlaceExtractor {
    scroller: StagnationScroller,
    max_reviews: usize,
}

impl PlaceExtractor {
    pub fn new(policy: ScrollPolicy, max_reviews: usize) -> Self {
        PlaceExtractor {
            scroller: StagnationScroller::new(policy),
            max_reviews,
        }
    }

    pub fn extract(&self, page: &mut dyn PlacePage, url: &str) -> ExtractResult<PlaceExtraction> {
        page.open_place(url)?;

        // Name and address live outside the feed; read them before scrolling
        // so a partial scroll never loses them.
        let identity = page.place_identity()?;

        let outcome = self.scroller.run(page)?;

        let mut raw = page.visible_reviews()?;
        raw.truncate(self.max_reviews);
        let reviews = Place::dedup_reviews(raw);

        debug!(
            "{}: {} rounds, {} cards loaded, {} unique reviews",
            url,
            outcome.rounds,
            outcome.final_count,
            reviews.len()
        );

        Ok(PlaceExtraction {
            place: Place {
                place_url: url.to_string(),
                place_name: identity.name,
                place_location: identity.location,
                reviews,
            },
            possibly_incomplete: outcome.possibly_incomplete,
        })
    }
}
