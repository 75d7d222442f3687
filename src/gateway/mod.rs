//! Contract with the hosted generative-AI service.
//!
//! Requests carry a list of typed parts (text or inline media); responses
//! are text, inline audio, inline image, or a URI for media produced by a
//! long-running operation.
mod gemini;
mod gemini_live;
mod live;

pub use gemini::*;
pub use gemini_live::*;
pub use live::*;

use async_trait::async_trait;
use log::{debug, info};
use tokio::time::{sleep, Duration};

use crate::{DeskError, Result};

/// One piece of request content
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn media(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Part::InlineData {
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// What the caller wants back
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseKind {
    Text,
    /// Synthesized speech in the named prebuilt voice
    Audio { voice: String },
    Image,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub parts: Vec<Part>,
    pub response: ResponseKind,
}

impl GenerateRequest {
    /// Plain text prompt expecting a text answer.
    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            parts: vec![Part::text(prompt)],
            response: ResponseKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutput {
    Text(String),
    Audio { mime_type: String, data: Vec<u8> },
    Image { mime_type: String, data: Vec<u8> },
    /// Location of media produced by a long-running operation
    MediaUri(String),
}

/// State of a long-running generation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    pub done: bool,
    pub output: Option<GatewayOutput>,
    pub error: Option<String>,
}

/// Stateless request/response access to the AI service.
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// Runs a single generation.
    async fn generate(&self, request: GenerateRequest) -> Result<GatewayOutput>;

    /// Starts a long-running generation (video).
    async fn start_operation(&self, model: &str, prompt: &str) -> Result<Operation>;

    /// Fetches the current state of an operation.
    async fn poll_operation(&self, name: &str) -> Result<Operation>;
}

/// Polls `operation` every `interval` until it finishes, at most
/// `max_polls` times.
pub async fn poll_until_done(
    gateway: &dyn AiGateway,
    mut operation: Operation,
    interval: Duration,
    max_polls: u32,
) -> Result<GatewayOutput> {
    let mut polls = 0;
    while !operation.done {
        if polls >= max_polls {
            return Err(DeskError::OperationTimedOut {
                name: operation.name,
                attempts: polls,
            });
        }
        sleep(interval).await;
        polls += 1;
        debug!("Polling operation {} (attempt {})", operation.name, polls);
        operation = gateway.poll_operation(&operation.name).await?;
    }

    if let Some(message) = operation.error {
        return Err(DeskError::GatewayError { message });
    }
    info!("Operation {} finished after {} polls", operation.name, polls);
    operation.output.ok_or_else(|| DeskError::GatewayError {
        message: format!("operation {} finished without output", operation.name),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;

    /// Gateway double returning canned answers and recording requests.
    #[derive(Default)]
    pub struct FakeGateway {
        pub outputs: Mutex<VecDeque<Result<GatewayOutput>>>,
        pub polls: Mutex<VecDeque<Operation>>,
        pub requests: Mutex<Vec<GenerateRequest>>,
    }

    impl FakeGateway {
        pub fn answering(outputs: Vec<Result<GatewayOutput>>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into()),
                ..Self::default()
            }
        }

        pub fn last_request(&self) -> Option<GenerateRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl AiGateway for FakeGateway {
        async fn generate(&self, request: GenerateRequest) -> Result<GatewayOutput> {
            self.requests.lock().unwrap().push(request);
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(DeskError::GatewayError {
                        message: "no canned output".into(),
                    })
                })
        }

        async fn start_operation(&self, _model: &str, _prompt: &str) -> Result<Operation> {
            Ok(Operation {
                name: "operations/fake".into(),
                done: false,
                output: None,
                error: None,
            })
        }

        async fn poll_operation(&self, name: &str) -> Result<Operation> {
            Ok(self.polls.lock().unwrap().pop_front().unwrap_or(Operation {
                name: name.to_string(),
                done: false,
                output: None,
                error: None,
            }))
        }
    }
}
