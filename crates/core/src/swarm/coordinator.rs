//! # Swarm Coordinator
//!
//! Orchestrates a query through triage and, when needed, the full stage
//! chain. Two modes share the same structure:
//!
//! - [`Coordinator::run`] waits for each stage's complete text.
//! - [`Coordinator::run_streaming`] relays every fragment as a
//!   [`StreamEvent`] while accumulating the stage text for the next stage.
//!
//! A run is strictly sequential. Concurrency exists only across runs, which
//! share the registry, the provider and the conversation memory.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::events::StreamEvent;
use super::params::{ParameterOverrides, ResolvedParameters};
use super::pipeline::{PipelineRun, PipelineStage, StageOutput};
use super::registry::{ParameterCatalog, StageDefinition, StageRegistry, SYNTHESIZER};
use super::triage::TriageOutcome;
use crate::error::{ProviderError, ProviderResult, SwarmError, SwarmResult};
use crate::memory::ConversationMemory;
use crate::provider::{CompletionProvider, CompletionRequest, FragmentStream};

/// Events of a streaming run
pub type EventStream = Pin<Box<dyn Stream<Item = SwarmResult<StreamEvent>> + Send>>;

/// Configuration for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Total attempts per stage, first call included
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
    /// Per-attempt limit; for streams, the limit on opening and on the gap
    /// between fragments
    pub stage_timeout_secs: Option<u64>,
    /// Exchanges of history fed to triage and the interpreter
    pub context_items: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            stage_timeout_secs: None,
            context_items: 3,
        }
    }
}

impl CoordinatorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

/// Outcome of a non-streaming run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Triage answered directly
    pub is_simple: bool,
    /// Every stage that ran, in execution order
    pub stage_outputs: Vec<StageOutput>,
    /// The answer shown to the user
    pub final_text: String,
}

impl PipelineResult {
    /// Output of a stage, if it ran
    pub fn get(&self, stage_id: &str) -> Option<&str> {
        self.stage_outputs
            .iter()
            .find(|o| o.stage_id == stage_id)
            .map(|o| o.text.as_str())
    }
}

/// The swarm coordinator
#[derive(Clone)]
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<StageRegistry>,
    provider: Arc<dyn CompletionProvider>,
    memory: Option<Arc<ConversationMemory>>,
}

impl Coordinator {
    /// Create a coordinator over the default stage catalog, without memory
    pub fn new(config: CoordinatorConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            config,
            registry: Arc::new(StageRegistry::default()),
            provider,
            memory: None,
        }
    }

    /// Enable conversation memory
    pub fn with_memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn memory(&self) -> Option<&Arc<ConversationMemory>> {
        self.memory.as_ref()
    }

    /// Tunable parameters of every stage that has some
    pub fn agent_parameter_catalog(&self) -> ParameterCatalog {
        self.registry.parameter_catalog()
    }

    fn history(&self, user_id: &str) -> String {
        self.memory
            .as_ref()
            .map(|memory| memory.get_context(user_id, self.config.context_items))
            .unwrap_or_default()
    }

    fn remember(&self, query: &str, user_id: &str, response: &str) {
        if let Some(memory) = &self.memory {
            memory.add_exchange(user_id, query, response);
        }
    }

    /// Run the pipeline and wait for the final answer
    #[tracing::instrument(skip(self, overrides), fields(query_preview = %query.chars().take(50).collect::<String>()))]
    pub async fn run(
        &self,
        query: &str,
        user_id: &str,
        overrides: &ParameterOverrides,
    ) -> SwarmResult<PipelineResult> {
        let params = overrides.resolve(&self.registry)?;
        let mut run =
            PipelineRun::new(query, user_id, &self.history(user_id)).with_parameters(params);
        let mut simple_answer = None;

        while let Some(stage_id) = run.stage.stage_id() {
            let stage = self.registry.lookup(stage_id)?;
            let Some(input) = run.stage_input() else {
                break;
            };

            tracing::info!(stage = %stage.id, "Stage started");
            let text = self.query_stage(stage, &input, &run.params).await?;
            tracing::info!(stage = %stage.id, chars = text.len(), "Stage completed");

            if run.stage == PipelineStage::Triage {
                let outcome = TriageOutcome::parse(&text);
                run.record(&stage.name, text);
                if outcome.is_simple {
                    tracing::info!("Triage answered directly");
                    run.short_circuit();
                    simple_answer = Some(outcome.text);
                }
                continue;
            }
            run.record(&stage.name, text);
        }

        let is_simple = simple_answer.is_some();
        let final_text = simple_answer.unwrap_or_else(|| run.output(SYNTHESIZER).to_string());
        self.remember(query, user_id, &final_text);

        Ok(PipelineResult {
            is_simple,
            stage_outputs: run.into_outputs(),
            final_text,
        })
    }

    /// Run the pipeline and return only the answer
    pub async fn ask(
        &self,
        query: &str,
        user_id: &str,
        overrides: &ParameterOverrides,
    ) -> SwarmResult<String> {
        Ok(self.run(query, user_id, overrides).await?.final_text)
    }

    /// Run the pipeline, relaying every fragment as it arrives.
    ///
    /// Overrides are validated before the stream is returned. If a stage's
    /// stream fails, that stage is retried once through [`Self::query_stage`]
    /// and its whole text is emitted as a single event. Dropping the stream
    /// cancels the run; memory is only written once the last stage finishes.
    pub fn run_streaming(
        &self,
        query: &str,
        user_id: &str,
        overrides: &ParameterOverrides,
    ) -> SwarmResult<EventStream> {
        let params = overrides.resolve(&self.registry)?;
        let this = self.clone();
        let query = query.to_string();
        let user_id = user_id.to_string();

        let events = async_stream::stream! {
            let mut run = PipelineRun::new(&query, &user_id, &this.history(&user_id))
                .with_parameters(params);

            while let Some(stage_id) = run.stage.stage_id() {
                let stage = match this.registry.lookup(stage_id) {
                    Ok(stage) => stage,
                    Err(e) => {
                        let item: SwarmResult<StreamEvent> = Err(e);
                        yield item;
                        return;
                    }
                };
                let Some(input) = run.stage_input() else {
                    break;
                };

                tracing::info!(stage = %stage.id, "Stage started (streaming)");
                let request =
                    CompletionRequest::new(run.params.system_prompt(stage), input.clone());
                let mut text = String::new();
                let mut failure = None;

                match this.open_stream(&request).await {
                    Ok(mut fragments) => loop {
                        match this.next_fragment(&mut fragments).await {
                            Ok(Some(fragment)) => {
                                text.push_str(&fragment);
                                let item: SwarmResult<StreamEvent> =
                                    Ok(StreamEvent::new(&stage.id, &stage.name, fragment));
                                yield item;
                            }
                            Ok(None) => break,
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    },
                    Err(e) => failure = Some(e),
                }

                if let Some(e) = failure {
                    tracing::warn!(
                        stage = %stage.id,
                        provider = this.provider.name(),
                        error = %e,
                        "Stream failed, falling back to a single completion"
                    );
                    match this.query_stage(stage, &input, &run.params).await {
                        Ok(full) => {
                            text = full;
                            let item: SwarmResult<StreamEvent> =
                                Ok(StreamEvent::new(&stage.id, &stage.name, text.clone()));
                            yield item;
                        }
                        Err(e) => {
                            let item: SwarmResult<StreamEvent> = Err(e);
                            yield item;
                            return;
                        }
                    }
                }
                tracing::info!(stage = %stage.id, chars = text.len(), "Stage completed (streaming)");

                if run.stage == PipelineStage::Triage {
                    let outcome = TriageOutcome::parse(&text);
                    run.record(&stage.name, text);
                    if outcome.is_simple {
                        tracing::info!("Triage answered directly");
                        run.short_circuit();
                        this.remember(&query, &user_id, &outcome.text);
                        let item: SwarmResult<StreamEvent> =
                            Ok(StreamEvent::simple_response(outcome.text));
                        yield item;
                        return;
                    }
                    continue;
                }
                run.record(&stage.name, text);
            }

            this.remember(&query, &user_id, run.output(SYNTHESIZER));
        };

        Ok(Box::pin(events))
    }

    /// One stage call with the stage's effective system prompt, retried up
    /// to `max_retries` total attempts.
    pub async fn query_stage(
        &self,
        stage: &StageDefinition,
        context: &str,
        params: &ResolvedParameters,
    ) -> SwarmResult<String> {
        let request = CompletionRequest::new(params.system_prompt(stage), context);
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = self.within_timeout(self.provider.complete(&request)).await;
            match result {
                Ok(text) => return Ok(text),
                Err(source) if attempt >= attempts => {
                    tracing::error!(
                        stage = %stage.id,
                        provider = self.provider.name(),
                        attempts = attempt,
                        error = %source,
                        "Stage failed"
                    );
                    return Err(SwarmError::Provider {
                        stage: stage.id.clone(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        stage = %stage.id,
                        provider = self.provider.name(),
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Stage attempt failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
            }
        }
    }

    async fn open_stream(&self, request: &CompletionRequest) -> ProviderResult<FragmentStream> {
        self.within_timeout(self.provider.stream(request)).await
    }

    async fn next_fragment(&self, fragments: &mut FragmentStream) -> ProviderResult<Option<String>> {
        self.within_timeout(async { fragments.next().await.transpose() })
            .await
    }

    async fn within_timeout<T, F>(&self, call: F) -> ProviderResult<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        match self.config.stage_timeout() {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ProviderError::Timeout(limit))?,
            None => call.await,
        }
    }
}
