//! Viewport trigger hook for presentation hosts.

use crate::feed::controller::FeedController;

/// Receives "the last slide is on screen" signals from a presentation layer.
///
/// Hosts fire this from whatever visibility mechanism they have
/// (intersection observers, scroll offsets, a keypress in a terminal).
/// Repeated or rapid signals are harmless.
pub trait LastItemVisible {
    /// Called when the slide at `last_index` becomes the last visible one.
    fn on_last_item_visible(&self, last_index: usize);
}

impl LastItemVisible for FeedController {
    fn on_last_item_visible(&self, last_index: usize) {
        if !self.has_more() {
            return;
        }
        // Detached: the item list is the channel the host watches.
        if let Err(e) = self.spawn_next(last_index + 1) {
            tracing::warn!(index = last_index + 1, "feed signal dropped: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FeedError, Result};
    use crate::feed::ItemState;
    use crate::image::ImagePayload;
    use crate::source::{EditOutcome, EditSource, PromptSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed;

    #[async_trait]
    impl PromptSource for Fixed {
        async fn instructions(&self) -> Result<Vec<String>> {
            Ok(vec!["make it blue".into(), "add a hat".into()])
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl EditSource for Counting {
        async fn edit(&self, _source: &ImagePayload, _instruction: &str) -> Result<EditOutcome> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(EditOutcome::image(ImagePayload::new("abc", "image/png")))
        }
    }

    async fn settle(feed: &FeedController, index: usize) {
        for _ in 0..1000 {
            if feed
                .item(index)
                .map(|item| item.state().is_settled())
                .unwrap_or(false)
            {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        panic!("item {index} never settled");
    }

    #[tokio::test]
    async fn test_signals_drive_the_feed() {
        let edits = Arc::new(Counting::default());
        let feed = FeedController::from_parts(Arc::new(Fixed), edits.clone());
        feed.accept_source_image("aGVsbG8=", "image/png").await.unwrap();

        feed.on_last_item_visible(0);
        feed.on_last_item_visible(0);
        settle(&feed, 1).await;
        assert_eq!(feed.item(1).unwrap().state(), ItemState::Ready);

        feed.on_last_item_visible(1);
        settle(&feed, 2).await;

        // Exhausted: further signals do nothing.
        feed.on_last_item_visible(2);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(feed.items().len(), 3);
        assert_eq!(edits.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_signal_without_session_is_ignored() {
        let feed = FeedController::new(Fixed, Counting::default());
        feed.on_last_item_visible(0);
        tokio::task::yield_now().await;
        assert!(feed.items().is_empty());
    }

    #[test]
    fn test_signal_from_plain_thread_uses_captured_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let edits = Arc::new(Counting::default());
        let feed = runtime.block_on(async {
            let feed = FeedController::from_parts(Arc::new(Fixed), edits.clone());
            feed.accept_source_image("aGVsbG8=", "image/png").await.unwrap();
            feed
        });

        let signaller = feed.clone();
        std::thread::spawn(move || signaller.on_last_item_visible(0))
            .join()
            .unwrap();

        runtime.block_on(settle(&feed, 1));
        assert_eq!(feed.item(1).unwrap().state(), ItemState::Ready);
        assert_eq!(edits.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_without_runtime_is_refused() {
        let edits = Arc::new(Counting::default());
        let feed = FeedController::from_parts(Arc::new(Fixed), edits.clone());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime
            .block_on(feed.accept_source_image("aGVsbG8=", "image/png"))
            .unwrap();
        drop(runtime);

        let signaller = feed.clone();
        let spawned = std::thread::spawn(move || {
            signaller.on_last_item_visible(0);
            signaller.spawn_next(1)
        })
        .join()
        .unwrap();

        assert!(matches!(spawned, Err(FeedError::NoRuntime)));
        assert_eq!(feed.items().len(), 1);
        assert!(feed.has_more());
        assert_eq!(edits.0.load(Ordering::SeqCst), 0);
    }
}
