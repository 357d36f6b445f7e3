//! In-process `ChatModel` used by unit tests.

use super::{ChatModel, ChatOptions};
use crate::models::{Message, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

type Responder = Box<dyn Fn(&[Message]) -> Result<String> + Send + Sync>;

/// Answers every request with a caller-supplied function.
pub(crate) struct StubModel {
    respond: Responder,
    calls: AtomicUsize,
}

impl StubModel {
    pub(crate) fn new(respond: impl Fn(&[Message]) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always returns the same text.
    pub(crate) fn fixed(response: &str) -> Self {
        let response = response.to_string();
        Self::new(move |_| Ok(response.clone()))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for StubModel {
    fn model(&self) -> &str {
        "stub-model"
    }

    async fn chat(&self, messages: Vec<Message>, _options: &ChatOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(&messages)
    }
}
