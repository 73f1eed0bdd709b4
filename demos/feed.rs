//! Feed example - walks the first few edits of a photo.
//!
//! Run with: `cargo run --example feed -- <photo.jpg>`
//!
//! Requires `GOOGLE_API_KEY` environment variable.

use editfeed::{intake, FeedController, GeminiProvider, ItemState};
use std::sync::Arc;

const EDITS: usize = 3;

#[tokio::main]
async fn main() -> editfeed::Result<()> {
    let input_path = std::env::args()
        .nth(1)
        .expect("Usage: feed <photo.jpg>");

    let provider = GeminiProvider::builder().prompt_count(EDITS).build()?;
    let feed = FeedController::with_source(Arc::new(provider));

    feed.accept_image(intake::from_path(&input_path)?).await?;
    println!("{} instructions for {}", feed.instructions().len(), input_path);

    while let Some(index) = feed.next_index() {
        feed.request_next(index).await?;

        let Some(item) = feed.item(index) else { continue };
        match (item.state(), item.payload()) {
            (ItemState::Ready, Some(image)) => {
                let ext = image.format().unwrap_or_default().extension();
                let path = format!("{}.{}", index, ext);
                image.save(&path)?;
                println!("[{}] {} -> {}", index, item.caption(), path);
            }
            _ => println!(
                "[{}] {} failed: {}",
                index,
                item.caption(),
                item.failure_reason().unwrap_or_default()
            ),
        }
    }

    Ok(())
}
