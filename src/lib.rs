#![warn(missing_docs)]
//! editfeed - an endless feed of AI edits of one photo.
//!
//! Hand the controller a photo and it fetches a list of edit
//! instructions once, then generates one edited variant per instruction
//! as the viewer reaches the end of the feed.
//!
//! # Quick Start
//!
//! ```no_run
//! use editfeed::{intake, FeedController, GeminiProvider, ItemState};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> editfeed::Result<()> {
//!     let provider = Arc::new(GeminiProvider::builder().build()?);
//!     let feed = FeedController::with_source(provider);
//!
//!     feed.accept_image(intake::from_path("cat.jpg")?).await?;
//!     while let Some(index) = feed.next_index() {
//!         feed.request_next(index).await?;
//!         if let Some(item) = feed.item(index) {
//!             if item.state() == ItemState::Ready {
//!                 println!("{}: {}", index, item.caption());
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini` (default): Gemini prompt and edit sources
//! - `cli`: the `editfeed` command-line host

mod error;
pub mod feed;
pub mod image;
pub mod intake;
pub mod providers;
mod source;

pub use error::{FeedError, Result};
pub use feed::{
    FeedController, FeedItem, FeedSnapshot, ItemState, LastItemVisible, Trigger,
};
pub use image::{ImageFormat, ImagePayload};
pub use source::{EditOutcome, EditSource, PromptSource};

#[cfg(feature = "gemini")]
pub use providers::{GeminiModel, GeminiProvider, GeminiProviderBuilder, GeminiTextModel};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{FeedError, Result};
    pub use crate::feed::{FeedController, FeedItem, ItemState, LastItemVisible};
    pub use crate::image::ImagePayload;
    pub use crate::source::{EditOutcome, EditSource, PromptSource};

    #[cfg(feature = "gemini")]
    pub use crate::providers::GeminiProvider;
}
