//! The generation feed controller.
//!
//! Owns one session at a time: the accepted source photo, the instruction
//! list fetched for it, and the feed items materialized so far. Every
//! asynchronous completion re-checks the session generation before it
//! touches state, so a reset (or a new photo) silently orphans whatever
//! was still in flight.

use crate::error::{FeedError, Result};
use crate::feed::item::{FeedItem, ItemState, GENERIC_FAILURE};
use crate::image::ImagePayload;
use crate::intake;
use crate::source::{EditOutcome, EditSource, PromptSource};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Banner shown when a session could not be started.
pub const SESSION_ERROR: &str = "Failed to process image or generate prompts. Please try again.";

/// What a call to [`FeedController::request_next`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The item was generated and settled in the given state.
    Settled(ItemState),
    /// The item already existed; nothing was requested.
    AlreadyRequested(ItemState),
    /// The session changed while the edit was in flight; the result was dropped.
    Discarded,
}

/// Point-in-time view of the feed for presentation hosts.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    /// Items in feed order, original first.
    pub items: Vec<FeedItem>,
    /// Whether another item can be requested.
    pub has_more: bool,
    /// Whether the instruction list is still being fetched.
    pub is_loading: bool,
    /// Session error banner, if the last accept failed.
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Session {
    generation: u64,
    source: Option<Arc<ImagePayload>>,
    instructions: Vec<String>,
    items: Vec<FeedItem>,
    loading: bool,
    error: Option<String>,
}

impl Session {
    fn materialized(&self) -> usize {
        self.items.len().saturating_sub(1)
    }

    fn has_more(&self) -> bool {
        self.source.is_some() && self.materialized() < self.instructions.len()
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut FeedItem> {
        self.items.iter_mut().find(|item| item.index() == index)
    }
}

struct Inner {
    prompts: Arc<dyn PromptSource>,
    edits: Arc<dyn EditSource>,
    runtime: Option<Handle>,
    session: Mutex<Session>,
}

/// Drives a scroll-triggered feed of edits of one source photo.
///
/// Cloning is cheap and every clone drives the same session, so hosts can
/// hand copies to intake and presentation code alike.
#[derive(Clone)]
pub struct FeedController {
    inner: Arc<Inner>,
}

impl FeedController {
    /// Creates a controller over separate prompt and edit sources.
    pub fn new<P, E>(prompts: P, edits: E) -> Self
    where
        P: PromptSource + 'static,
        E: EditSource + 'static,
    {
        Self::from_parts(Arc::new(prompts), Arc::new(edits))
    }

    /// Creates a controller over one service that provides both sources.
    pub fn with_source<S>(source: Arc<S>) -> Self
    where
        S: PromptSource + EditSource + 'static,
    {
        Self::from_parts(source.clone(), source)
    }

    /// Creates a controller from shared source handles.
    ///
    /// If called inside a tokio runtime, that runtime is remembered for
    /// [`spawn_next`](Self::spawn_next), so later triggers may come from
    /// threads that have no runtime of their own.
    pub fn from_parts(prompts: Arc<dyn PromptSource>, edits: Arc<dyn EditSource>) -> Self {
        Self::from_parts_on(prompts, edits, Handle::try_current().ok())
    }

    /// Like [`from_parts`](Self::from_parts) with an explicit runtime.
    pub fn from_parts_on(
        prompts: Arc<dyn PromptSource>,
        edits: Arc<dyn EditSource>,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                prompts,
                edits,
                runtime,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a session from host-encoded base64 and its MIME type.
    ///
    /// Any previous session is dropped first. If the payload does not
    /// decode, or the instruction list cannot be fetched, the new session
    /// is rolled back entirely and [`error`](Self::error) carries the banner.
    pub async fn accept_source_image(&self, payload: &str, mime_type: &str) -> Result<()> {
        let generation = self.begin_session();
        match intake::from_encoded(payload, mime_type) {
            Ok(image) => self.load_session(generation, image).await,
            Err(e) => Err(self.abort_session(generation, e)),
        }
    }

    /// Starts a session from an already-normalized payload.
    pub async fn accept_image(&self, image: ImagePayload) -> Result<()> {
        let generation = self.begin_session();
        self.load_session(generation, image).await
    }

    fn begin_session(&self) -> u64 {
        let mut session = self.session();
        let generation = session.generation + 1;
        *session = Session {
            generation,
            loading: true,
            ..Session::default()
        };
        generation
    }

    async fn load_session(&self, generation: u64, image: ImagePayload) -> Result<()> {
        {
            let mut session = self.session();
            if session.generation != generation {
                return Err(FeedError::Superseded);
            }
            let image = Arc::new(image);
            session.items = vec![FeedItem::original(ImagePayload::clone(&image))];
            session.source = Some(image);
        }

        let start = Instant::now();
        let fetched = match self.inner.prompts.instructions().await {
            Ok(list) if list.is_empty() => Err(FeedError::PromptGeneration(
                "prompt source returned no instructions".into(),
            )),
            other => other,
        };

        let instructions = match fetched {
            Ok(list) => list,
            Err(e) => return Err(self.abort_session(generation, e)),
        };

        let mut session = self.session();
        if session.generation != generation {
            tracing::debug!(session = generation, "instructions arrived for a replaced session");
            return Err(FeedError::Superseded);
        }
        tracing::info!(
            session = generation,
            count = instructions.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "session ready"
        );
        session.instructions = instructions;
        session.loading = false;
        Ok(())
    }

    fn abort_session(&self, generation: u64, error: FeedError) -> FeedError {
        let mut session = self.session();
        if session.generation == generation {
            tracing::warn!(session = generation, "session aborted: {error}");
            *session = Session {
                generation,
                error: Some(SESSION_ERROR.to_string()),
                ..Session::default()
            };
        }
        error
    }

    /// Materializes feed position `index` (1-based over the instructions).
    ///
    /// Only the next position may be requested. A second request for a
    /// position that already exists is a no-op reported as
    /// [`Trigger::AlreadyRequested`]. A failed edit is not an error here:
    /// the item settles as `Failed` and the feed carries on.
    pub async fn request_next(&self, index: usize) -> Result<Trigger> {
        let (generation, source, instruction) = {
            let mut session = self.session();
            let source = session.source.clone().ok_or(FeedError::NoSession)?;

            let available = session.instructions.len();
            if index == 0 || index > available {
                return Err(FeedError::IndexOutOfRange { index, available });
            }
            if let Some(existing) = session.items.iter().find(|item| item.index() == index) {
                return Ok(Trigger::AlreadyRequested(existing.state()));
            }
            let expected = session.items.len();
            if index != expected {
                return Err(FeedError::OutOfOrder { index, expected });
            }

            let instruction = session.instructions[index - 1].clone();
            session.items.push(FeedItem::pending(index, instruction.clone()));
            (session.generation, source, instruction)
        };

        tracing::debug!(session = generation, index, %instruction, "requesting edit");
        let start = Instant::now();
        let settled = match self.inner.edits.edit(&source, &instruction).await {
            Ok(EditOutcome {
                image: Some(image), ..
            }) => Ok(image),
            Ok(EditOutcome { text, image: None }) => Err(text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE.to_string())),
            Err(e) => Err(e.to_string()),
        };

        let mut session = self.session();
        if session.generation != generation {
            tracing::debug!(session = generation, index, "discarding edit for a replaced session");
            return Ok(Trigger::Discarded);
        }
        let Some(item) = session.item_mut(index) else {
            return Ok(Trigger::Discarded);
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let applied = match settled {
            Ok(image) => {
                tracing::info!(session = generation, index, duration_ms, "edit ready");
                item.resolve(image)
            }
            Err(reason) => {
                tracing::warn!(session = generation, index, duration_ms, %reason, "edit failed");
                item.fail(reason)
            }
        };

        if applied {
            Ok(Trigger::Settled(item.state()))
        } else {
            Ok(Trigger::Discarded)
        }
    }

    /// Runs [`request_next`](Self::request_next) as a background task.
    ///
    /// Uses the runtime captured at construction, else the caller's.
    /// Fails with [`FeedError::NoRuntime`] when neither exists.
    pub fn spawn_next(&self, index: usize) -> Result<JoinHandle<Result<Trigger>>> {
        let runtime = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(FeedError::NoRuntime)?;

        let controller = self.clone();
        Ok(runtime.spawn(async move {
            let result = controller.request_next(index).await;
            if let Err(ref e) = result {
                tracing::debug!(index, "trigger rejected: {e}");
            }
            result
        }))
    }

    /// Drops the current session. In-flight work finishes but is discarded.
    pub fn reset(&self) {
        let mut session = self.session();
        let generation = session.generation + 1;
        tracing::debug!(session = generation, "session reset");
        *session = Session {
            generation,
            ..Session::default()
        };
    }

    /// Whether another item can be requested.
    pub fn has_more(&self) -> bool {
        self.session().has_more()
    }

    /// Number of generated items, excluding the original.
    pub fn materialized(&self) -> usize {
        self.session().materialized()
    }

    /// The next index [`request_next`](Self::request_next) will accept, if any.
    pub fn next_index(&self) -> Option<usize> {
        let session = self.session();
        session.has_more().then(|| session.items.len())
    }

    /// Items in feed order.
    pub fn items(&self) -> Vec<FeedItem> {
        self.session().items.clone()
    }

    /// The item at `index`, if it exists.
    pub fn item(&self, index: usize) -> Option<FeedItem> {
        self.session()
            .items
            .iter()
            .find(|item| item.index() == index)
            .cloned()
    }

    /// The instruction list for the current session.
    pub fn instructions(&self) -> Vec<String> {
        self.session().instructions.clone()
    }

    /// The accepted source photo.
    pub fn source_image(&self) -> Option<Arc<ImagePayload>> {
        self.session().source.clone()
    }

    /// Whether the instruction list is still being fetched.
    pub fn is_loading(&self) -> bool {
        self.session().loading
    }

    /// The session error banner, if the last accept failed.
    pub fn error(&self) -> Option<String> {
        self.session().error.clone()
    }

    /// Captures the whole feed state at once.
    pub fn snapshot(&self) -> FeedSnapshot {
        let session = self.session();
        FeedSnapshot {
            items: session.items.clone(),
            has_more: session.has_more(),
            is_loading: session.loading,
            error: session.error.clone(),
        }
    }
}

impl std::fmt::Debug for FeedController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session();
        f.debug_struct("FeedController")
            .field("generation", &session.generation)
            .field("items", &session.items.len())
            .field("instructions", &session.instructions.len())
            .field("loading", &session.loading)
            .finish()
    }
}
