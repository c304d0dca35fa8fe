pub mod batch_manager;
pub mod browser;
pub mod delay_manager;
pub mod error;
pub mod fsio;
pub mod link_extractor;
pub mod link_loader;
pub mod logger;
pub mod master_store;
pub mod models;
pub mod page;
pub mod place_extractor;
pub mod resume_manager;
pub mod scroller;

// Exporting types for convenience
pub use batch_manager::{BatchConfig, BatchReport, BatchRunner};
pub use error::{ExtractError, StateError};
pub use link_extractor::LinkExtractor;
pub use master_store::MasterStore;
pub use models::{Place, Review};
pub use place_extractor::PlaceExtractor;
pub use resume_manager::{ProgressState, ResumeManager};
pub use scroller::{ScrollOutcome, ScrollPolicy, StagnationScroller};
