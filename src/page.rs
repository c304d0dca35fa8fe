//! Capability traits the orchestration core consumes from the UI-interaction
//! layer. The Maps DOM is volatile; everything selector-shaped lives behind
//! these traits (see `browser`), so the core never touches the page directly.

use crate::error::ExtractResult;
use crate::models::Review;

/// An incrementally loading list that can be measured and scrolled forward.
/// `advance` may block on navigation, render or network settle.
pub trait ScrollFeed {
    /// Current number of loaded items.
    fn measure(&mut self) -> ExtractResult<usize>;

    /// Trigger loading of more items (scroll / load-more).
    fn advance(&mut self) -> ExtractResult<()>;
}

/// The search-results panel for one query.
pub trait SearchPage: ScrollFeed {
    fn open_search(&mut self, query: &str) -> ExtractResult<()>;

    /// Raw hrefs of every place anchor currently in the DOM, un-normalized
    /// and possibly duplicated.
    fn visible_links(&mut self) -> ExtractResult<Vec<String>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceIdentity {
    pub name: String,
    pub location: String,
}

/// One place's page with its review feed. A single implementation instance
/// is reused across links; `open_place` renavigates the shared tab.
pub trait PlacePage: ScrollFeed {
    fn open_place(&mut self, url: &str) -> ExtractResult<()>;

    /// Place name and address, readable before any scrolling happens.
    fn place_identity(&mut self) -> ExtractResult<PlaceIdentity>;

    /// Every review card currently loaded in the feed, in DOM order.
    fn visible_reviews(&mut self) -> ExtractResult<Vec<Review>>;
}
