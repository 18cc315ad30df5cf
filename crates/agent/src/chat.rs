//! The chat turn pipeline.
//!
//! One call to [`ChatService::send_message`] runs a full turn:
//!
//! 1. Load the conversation and its history
//! 2. Refresh topology (reconciling identities on the way)
//! 3. Retrieve similar samples
//! 4. Assemble the grounded prompt
//! 5. Check the context budget
//! 6. Call the model
//! 7. Append the raw user text and the reply
//!
//! Nothing is written to the conversation unless the model answered.

use std::sync::Arc;
use std::time::{Duration, Instant};

use netintent_config::{AppConfig, TelemetryFallback};
use netintent_core::conversation::ConversationStore;
use netintent_core::embedding::Embedder;
use netintent_core::error::{ContextOverflow, ProviderError, StoreError, TelemetryError};
use netintent_core::identity::IdentityStore;
use netintent_core::message::{Conversation, ConversationId, Message};
use netintent_core::provider::{Provider, ProviderRequest, Usage};
use netintent_core::sample::SampleStore;
use netintent_core::topology::{TelemetrySource, TopologySnapshot};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{BudgetUsage, ContextGovernor};
use crate::prompt::{DEFAULT_SYSTEM_PROMPT, PromptAssembler, SectionStats};
use crate::reconcile::{Reconciler, SnapshotResult};
use crate::retrieval::{RetrievalOutcome, Retriever, SampleSummary};

/// Longest automatic conversation title, in characters.
pub const TITLE_MAX_CHARS: usize = 60;

/// Errors that stop a turn. Nothing is appended when one is returned.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Telemetry unavailable: {0}")]
    TelemetryUnavailable(#[from] TelemetryError),

    #[error(transparent)]
    ContextOverflow(#[from] ContextOverflow),

    #[error("Model call failed: {0}")]
    ModelCallFailed(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for TurnError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationNotFound(id) => Self::ConversationNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Per-turn choices.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// Overrides the configured model
    pub model: Option<String>,
    pub use_rag: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            model: None,
            use_rag: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TurnTimings {
    pub network_fetch_seconds: f64,
    pub rag_seconds: f64,
    pub embedding_seconds: f64,
    pub query_seconds: f64,
    pub prompt_build_seconds: f64,
    pub llm_seconds: f64,
    pub total_seconds: f64,
}

/// Everything a completed turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub conversation: Conversation,
    pub reply: String,
    pub model: String,
    pub use_rag: bool,
    /// Retrieval note first, then any topology note
    pub notes: Vec<String>,
    pub samples: Vec<SampleSummary>,
    pub stale_topology: bool,
    pub budget: BudgetUsage,
    pub prompt_sections: Vec<SectionStats>,
    pub usage: Option<Usage>,
    pub timings: TurnTimings,
    pub reconciliation: Option<SnapshotResult>,
}

/// Settings a turn reads from configuration.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub top_k: usize,
    /// When false, every turn runs without retrieval
    pub retrieval_enabled: bool,
    pub on_telemetry_failure: TelemetryFallback,
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_model: config.provider.default_model.clone(),
            temperature: config.provider.temperature,
            max_tokens: config.provider.max_tokens,
            top_k: config.retrieval.top_k,
            retrieval_enabled: config.retrieval.enabled,
            on_telemetry_failure: config.controller.on_failure,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The collaborators a chat service runs against.
pub struct Collaborators {
    pub provider: Arc<dyn Provider>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub identity: Arc<dyn IdentityStore>,
    pub samples: Arc<dyn SampleStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub embedder: Arc<dyn Embedder>,
}

pub struct ChatService {
    provider: Arc<dyn Provider>,
    telemetry: Arc<dyn TelemetrySource>,
    conversations: Arc<dyn ConversationStore>,
    reconciler: Reconciler,
    retriever: Retriever,
    assembler: PromptAssembler,
    governor: ContextGovernor,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        provider: Arc<dyn Provider>,
        telemetry: Arc<dyn TelemetrySource>,
        conversations: Arc<dyn ConversationStore>,
        reconciler: Reconciler,
        retriever: Retriever,
        governor: ContextGovernor,
        settings: ChatSettings,
    ) -> Self {
        Self {
            provider,
            telemetry,
            conversations,
            reconciler,
            retriever,
            assembler: PromptAssembler::new(),
            governor,
            settings,
        }
    }

    /// Wire a service from configuration.
    pub fn from_config(config: &AppConfig, parts: Collaborators) -> Self {
        let preamble = config
            .context
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Self::new(
            parts.provider,
            parts.telemetry,
            parts.conversations,
            Reconciler::new(
                parts.identity,
                Duration::from_secs(config.controller.timeout_secs),
            ),
            Retriever::new(
                parts.embedder,
                parts.samples,
                Duration::from_secs(config.retrieval.timeout_secs),
            ),
            ContextGovernor::new(preamble, config.context.budget_tokens),
            ChatSettings::from_config(config),
        )
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub async fn create_conversation(
        &self,
        title: Option<String>,
    ) -> std::result::Result<Conversation, TurnError> {
        let title = title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let conversation = self.conversations.create(title).await?;
        info!(conversation_id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    /// Most recently updated first.
    pub async fn list_conversations(&self) -> std::result::Result<Vec<Conversation>, TurnError> {
        Ok(self.conversations.list().await?)
    }

    pub async fn history(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Vec<Message>, TurnError> {
        Ok(self.conversations.history(id).await?)
    }

    /// Run one chat turn.
    pub async fn send_message(
        &self,
        id: &ConversationId,
        user_text: &str,
        options: TurnOptions,
    ) -> std::result::Result<TurnOutcome, TurnError> {
        let started = Instant::now();
        let mut timings = TurnTimings::default();

        if user_text.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        self.conversations
            .get(id)
            .await?
            .ok_or_else(|| TurnError::ConversationNotFound(id.to_string()))?;
        let history = self.conversations.history(id).await?;

        let t = Instant::now();
        let (snapshot, reconciliation) = self.topology().await?;
        timings.network_fetch_seconds = t.elapsed().as_secs_f64();

        let use_rag = options.use_rag && self.settings.retrieval_enabled;
        let t = Instant::now();
        let retrieval = if use_rag {
            self.retriever.retrieve(user_text, self.settings.top_k).await
        } else {
            RetrievalOutcome::disabled()
        };
        timings.rag_seconds = t.elapsed().as_secs_f64();
        timings.embedding_seconds = retrieval.timings.embedding_seconds;
        timings.query_seconds = retrieval.timings.query_seconds;

        let t = Instant::now();
        let prompt = self.assembler.assemble(&snapshot, &retrieval, user_text);
        timings.prompt_build_seconds = t.elapsed().as_secs_f64();

        let budget = self.governor.check(&history, &prompt.text)?;
        debug!(
            conversation_id = %id,
            estimated = budget.estimated,
            budget = budget.budget,
            "Grounded prompt assembled"
        );

        let model = options
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.settings.default_model.clone());

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.governor.preamble()));
        messages.extend(history);
        messages.push(Message::user(prompt.text));

        let request = ProviderRequest {
            model: model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let t = Instant::now();
        let response = self.provider.complete(request).await.map_err(|e| {
            warn!(
                provider = self.provider.name(),
                model = %model,
                error = %e,
                "Model call failed"
            );
            TurnError::ModelCallFailed(e)
        })?;
        timings.llm_seconds = t.elapsed().as_secs_f64();

        let reply = response.message.content;
        let title = title_from(user_text);
        let conversation = self
            .conversations
            .append(
                id,
                &[Message::user(user_text), Message::assistant(reply.as_str())],
                Some(&title),
            )
            .await?;
        timings.total_seconds = started.elapsed().as_secs_f64();

        info!(
            conversation_id = %id,
            model = %model,
            use_rag,
            samples = retrieval.matches.len(),
            stale = snapshot.stale,
            llm_seconds = timings.llm_seconds,
            "Chat turn complete"
        );

        let mut notes = vec![retrieval.note.clone()];
        notes.extend(snapshot.note.clone());

        Ok(TurnOutcome {
            conversation,
            reply,
            model,
            use_rag,
            notes,
            samples: retrieval.summary(),
            stale_topology: snapshot.stale,
            budget,
            prompt_sections: prompt.sections,
            usage: response.usage,
            timings,
            reconciliation,
        })
    }

    async fn topology(
        &self,
    ) -> std::result::Result<(TopologySnapshot, Option<SnapshotResult>), TurnError> {
        let err = match self.reconciler.refresh(self.telemetry.as_ref()).await {
            Ok(refreshed) => return Ok((refreshed.snapshot, refreshed.reconciliation)),
            Err(e) => e,
        };

        match self.settings.on_telemetry_failure {
            TelemetryFallback::Fail => {
                warn!(error = %err, "Controller unreachable, rejecting turn");
                Err(TurnError::TelemetryUnavailable(err))
            }
            TelemetryFallback::Stale => {
                warn!(error = %err, "Controller unreachable, using last known state");
                let mut snapshot = match self.reconciler.last_known_good().await {
                    Ok(snapshot) => snapshot,
                    Err(store_err) => {
                        warn!(error = %store_err, "No stored state to fall back on");
                        let mut empty = TopologySnapshot::empty();
                        empty.stale = true;
                        empty.note = Some("Live telemetry unavailable and no stored state.".into());
                        empty
                    }
                };
                let note = snapshot.note.take().unwrap_or_default();
                snapshot.note = Some(format!("{note} Cause: {err}"));
                Ok((snapshot, None))
            }
        }
    }
}

/// Automatic title: the first 60 characters of the trimmed text.
pub fn title_from(user_text: &str) -> String {
    let title: String = user_text.trim().chars().take(TITLE_MAX_CHARS).collect();
    if title.is_empty() {
        "New chat".to_string()
    } else {
        title
    }
}
