//! Generation source traits.
//!
//! The feed only needs two things from a generative service: a list of
//! edit instructions, and one edit per instruction. Anything that can do
//! both plugs in here.

use crate::error::Result;
use crate::image::ImagePayload;
use async_trait::async_trait;

/// Supplies the ordered list of edit instructions for a session.
#[async_trait]
pub trait PromptSource: Send + Sync {
    /// Returns one or more short, human-readable edit instructions.
    async fn instructions(&self) -> Result<Vec<String>>;
}

/// Applies a single instruction to the source photo.
#[async_trait]
pub trait EditSource: Send + Sync {
    /// Edits `source` according to `instruction`.
    ///
    /// An `Ok` outcome without an image is a refusal, not a transport
    /// error; `text` then usually explains why.
    async fn edit(&self, source: &ImagePayload, instruction: &str) -> Result<EditOutcome>;
}

/// What an edit source handed back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditOutcome {
    /// Any text the model produced alongside (or instead of) the image.
    pub text: Option<String>,
    /// The edited image, if one was produced.
    pub image: Option<ImagePayload>,
}

impl EditOutcome {
    /// An outcome carrying an edited image.
    pub fn image(image: ImagePayload) -> Self {
        Self {
            text: None,
            image: Some(image),
        }
    }

    /// An outcome with only an explanation and no image.
    pub fn refused(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    /// Returns true if an image was produced.
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}
