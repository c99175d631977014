//! Deterministic in-memory provider.
//!
//! Replies are consumed in order, one per call, which matches the strictly
//! sequential way the coordinator drives stages. Every call is recorded so
//! tests can assert on stage order and stage inputs.

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CompletionProvider, CompletionRequest, FragmentStream};
use crate::error::{ProviderError, ProviderResult};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed with these fragments (concatenated for non-streaming calls)
    Fragments(Vec<String>),
    /// Fail the call (or fail to open the stream)
    Fail(String),
    /// Open the stream, emit these fragments, then fail mid-stream.
    /// Non-streaming calls fail outright.
    BreakAfter(Vec<String>, String),
    /// Never answer
    Hang,
}

impl Script {
    /// Single-fragment success
    pub fn reply(text: impl Into<String>) -> Self {
        Script::Fragments(vec![text.into()])
    }

    /// Multi-fragment success
    pub fn fragments<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Script::Fragments(parts.into_iter().map(Into::into).collect())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Script::Fail(message.into())
    }
}

/// A recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub streaming: bool,
    pub request: CompletionRequest,
}

/// Provider that replays a fixed script
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl ScriptedProvider {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Script>,
    {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next(&self, streaming: bool, request: &CompletionRequest) -> ProviderResult<Script> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ProviderCall {
                streaming,
                request: request.clone(),
            });
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .ok_or_else(|| ProviderError::Unavailable("script exhausted".to_string()))
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        match self.next(false, request)? {
            Script::Fragments(parts) => Ok(parts.concat()),
            Script::Fail(message) | Script::BreakAfter(_, message) => {
                Err(ProviderError::Unavailable(message))
            }
            Script::Hang => std::future::pending().await,
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> ProviderResult<FragmentStream> {
        match self.next(true, request)? {
            Script::Fragments(parts) => Ok(Box::pin(stream::iter(
                parts.into_iter().map(Ok::<String, ProviderError>),
            ))),
            Script::Fail(message) => Err(ProviderError::Unavailable(message)),
            Script::BreakAfter(parts, message) => {
                let items = parts
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(ProviderError::Stream(message))));
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Hang => Ok(Box::pin(stream::pending::<ProviderResult<String>>())),
        }
    }
}
