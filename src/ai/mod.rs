//! Gateway module for gemchat
//!
//! Everything that talks to the remote backend lives here. The rest of the crate only sees
//! the [`Backend`] trait, so sessions and the connectivity probe can be driven by a fake
//! backend in tests.
//!
//! # Architecture
//!
//! - `client` - [`HttpBackend`], the reqwest implementation of the four gateway calls
//!
//! # Usage
//!
//! ```rust,no_run
//! use gemchat::ai::{Backend, HttpBackend};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let backend = HttpBackend::new("http://localhost:8000");
//! let reply = backend.send_text("Hello!").await?;
//! # Ok(())
//! # }
//! ```

mod client;

use crate::types::Attachment;
use async_trait::async_trait;
use serde::Deserialize;

pub use client::HttpBackend;

// ============================================
// Error Types
// ============================================

/// Any failed gateway call. Flows never look past "it failed".
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("gateway returned an empty {0}")]
    EmptyPayload(&'static str),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Output of the code-execution endpoint.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CodeExecution {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub execution_result: String,
}

// ============================================
// Backend
// ============================================

/// The remote AI backend: one stateless, fire-once call per flow plus a liveness check.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn send_text(&self, message: &str) -> ChatResult<String>;

    /// Returns the raw image payload: base64, a data URI or a URL.
    async fn generate_image(&self, prompt: &str) -> ChatResult<String>;

    async fn analyze_image(&self, file: &Attachment, question: Option<&str>)
    -> ChatResult<String>;

    async fn execute_code(&self, prompt: &str) -> ChatResult<CodeExecution>;

    async fn health(&self) -> ChatResult<()>;
}
