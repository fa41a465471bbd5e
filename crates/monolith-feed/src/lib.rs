//! monolith-feed — what's new, and what to watch.
//!
//! Two query modes over the same `RemoteLister` primitive:
//!
//! - [`ChangeFeedFetcher`]: items added within a lookback window, newest
//!   first, capped per kind
//! - [`SuggestionPicker`]: uniform random picks from the whole library

pub mod fetcher;
pub mod suggest;

pub use fetcher::{ChangeFeedCursor, ChangeFeedFetcher, select_recent};
pub use suggest::SuggestionPicker;
