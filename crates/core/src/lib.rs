//! # netintent core
//!
//! Domain types, collaborator traits, and error definitions for netintent.
//! This crate has no runtime dependencies; it defines the domain model that
//! every other crate implements against.
//!
//! Every collaborator of the chat pipeline is a trait here:
//! - [`TelemetrySource`] for the controller's live state
//! - [`IdentityStore`], [`SampleStore`], [`ConversationStore`] for persistence
//! - [`Embedder`] and [`Provider`] for the models

pub mod conversation;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod message;
pub mod provider;
pub mod sample;
pub mod topology;

// Re-export key types at crate root for ergonomics
pub use conversation::ConversationStore;
pub use embedding::Embedder;
pub use error::{
    ContextOverflow, Error, ProviderError, ReconciliationConflict, Result, RetrievalError,
    StoreError, TelemetryError,
};
pub use identity::{EntityRecord, EntityType, IdentityStore, ManagedEntity, Observation, UpsertOutcome};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use sample::{ConfigSample, NewConfigSample, SampleFilter, SampleStore, SampleUpdate, ScoredSample};
pub use topology::{ResourceKind, TelemetrySource, TopologySnapshot};
