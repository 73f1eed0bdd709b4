//! Feed items and their lifecycle.

use crate::image::ImagePayload;
use serde::{Deserialize, Serialize};

/// Caption shown on the untouched source photo.
pub const ORIGINAL_CAPTION: &str = "Original Image";

/// Reason recorded when an edit produced neither an image nor an explanation.
pub const GENERIC_FAILURE: &str = "AI failed to generate an image.";

/// Lifecycle state of a feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Generation requested, result not in yet.
    Pending,
    /// Image available.
    Ready,
    /// Generation failed; see [`FeedItem::failure_reason`].
    Failed,
}

impl ItemState {
    /// Returns true once the item can no longer change.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One slide in the feed: the original photo or one edited variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    index: usize,
    caption: String,
    state: ItemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<ImagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl FeedItem {
    pub(crate) fn original(payload: ImagePayload) -> Self {
        Self {
            index: 0,
            caption: ORIGINAL_CAPTION.to_string(),
            state: ItemState::Ready,
            payload: Some(payload),
            failure_reason: None,
        }
    }

    pub(crate) fn pending(index: usize, caption: impl Into<String>) -> Self {
        Self {
            index,
            caption: caption.into(),
            state: ItemState::Pending,
            payload: None,
            failure_reason: None,
        }
    }

    /// Moves a pending item to `Ready`. Returns false if already settled.
    pub(crate) fn resolve(&mut self, payload: ImagePayload) -> bool {
        if self.state.is_settled() {
            return false;
        }
        self.state = ItemState::Ready;
        self.payload = Some(payload);
        true
    }

    /// Moves a pending item to `Failed`. Returns false if already settled.
    pub(crate) fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.state.is_settled() {
            return false;
        }
        self.state = ItemState::Failed;
        self.failure_reason = Some(reason.into());
        true
    }

    /// Position in the feed; 0 is the original photo.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The instruction that produced this item.
    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ItemState {
        self.state
    }

    /// The image, once ready.
    pub fn payload(&self) -> Option<&ImagePayload> {
        self.payload.as_ref()
    }

    /// Why generation failed, for failed items.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns true for the untouched source photo.
    pub fn is_original(&self) -> bool {
        self.index == 0
    }
}
