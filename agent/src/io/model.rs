//! Model service contract.
//!
//! The [`ModelService`] trait decouples the orchestration loop from the hosted
//! backend (currently Gemini, see [`crate::io::gemini`]). Tests use scripted
//! services that return predetermined invocations without network access.

use async_trait::async_trait;
use anyhow::Result;

use crate::core::types::{Invocation, InvocationResult};

/// A message sent to the model service.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelMessage {
    /// Plain text prompt.
    Text(String),
    /// Results of the previous batch of invocations, in invocation order.
    Results(Vec<InvocationResult>),
}

/// A conversational, tool-calling model.
///
/// Implementations own their conversation history: each `send` continues the
/// same conversation.
#[async_trait]
pub trait ModelService: Send {
    /// Send `message` and return the proposed invocations (possibly none).
    async fn send(&mut self, message: ModelMessage) -> Result<Vec<Invocation>>;
}
