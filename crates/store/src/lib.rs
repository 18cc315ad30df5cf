//! Store implementations for netintent.
//!
//! Each backend implements all three persistence traits from core:
//! [`IdentityStore`](netintent_core::IdentityStore),
//! [`SampleStore`](netintent_core::SampleStore) and
//! [`ConversationStore`](netintent_core::ConversationStore).

pub mod in_memory;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use vector::{euclidean_distance, rank_nearest};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
