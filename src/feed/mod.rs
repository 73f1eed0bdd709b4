//! The scroll-driven edit feed.

mod controller;
mod item;
mod observer;

pub use controller::{FeedController, FeedSnapshot, Trigger, SESSION_ERROR};
pub use item::{FeedItem, ItemState, GENERIC_FAILURE, ORIGINAL_CAPTION};
pub use observer::LastItemVisible;
