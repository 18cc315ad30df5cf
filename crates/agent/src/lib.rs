//! The netintent chat pipeline.
//!
//! A turn flows through four stages before the model sees it:
//!
//! 1. **Reconcile**: refresh topology and keep operator names attached to
//!    the right entities ([`Reconciler`])
//! 2. **Retrieve**: find similar config samples ([`Retriever`])
//! 3. **Assemble**: build the grounded prompt ([`PromptAssembler`])
//! 4. **Govern**: reject turns that would exceed the context budget
//!    ([`ContextGovernor`])
//!
//! [`ChatService`] runs the stages in order, calls the model, and appends
//! the exchange to the conversation.

pub mod chat;
pub mod context;
pub mod library;
pub mod prompt;
pub mod reconcile;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use chat::{
    ChatService, ChatSettings, Collaborators, TurnError, TurnOptions, TurnOutcome, TurnTimings,
};
pub use context::{BudgetUsage, ContextGovernor, check_budget, estimate_tokens};
pub use library::{ImportReport, LibraryError, SampleLibrary};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, GroundedPrompt, PromptAssembler, SectionStats};
pub use reconcile::{
    EntityView, Migration, Reconciler, RefreshOutcome, SnapshotResult, stable_key_of,
};
pub use retrieval::{
    HashEmbedder, ProviderEmbedder, RawSample, RetrievalOutcome, Retriever, SampleSummary,
    embedder_from_config,
};
