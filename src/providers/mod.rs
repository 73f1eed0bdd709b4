//! Generation source implementations.

#[cfg(feature = "gemini")]
mod gemini;

#[cfg(feature = "gemini")]
pub use gemini::{
    GeminiModel, GeminiProvider, GeminiProviderBuilder, GeminiTextModel, DEFAULT_PROMPT_COUNT,
};
