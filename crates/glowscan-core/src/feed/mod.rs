//! Paged recommendation feed.
//!
//! `FeedPager` loads one page at a time from the catalog service using
//! integer page keys starting at 1. An empty page marks the end of the feed.
//! `PagingState` keeps the pages a view has loaded and computes the key to
//! reload when the view refreshes near its current scroll anchor.

pub mod filter;
pub mod pager;
pub mod state;

pub use filter::ItemFilter;
pub use pager::{FeedPage, FeedPager, LoadState, FIRST_PAGE};
pub use state::{compute_refresh_key, PagingState};
