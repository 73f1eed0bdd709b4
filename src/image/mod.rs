//! Image payloads shared by intake, the feed and the generation sources.

mod types;

pub use types::{ImageFormat, ImagePayload};
