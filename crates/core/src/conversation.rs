//! ConversationStore trait - append-only turn log per conversation.

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, Message};
use async_trait::async_trait;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn name(&self) -> &str;

    async fn create(&self, title: Option<String>) -> std::result::Result<Conversation, StoreError>;

    async fn get(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Option<Conversation>, StoreError>;

    /// Most recently updated first.
    async fn list(&self) -> std::result::Result<Vec<Conversation>, StoreError>;

    /// Messages in append order.
    async fn history(&self, id: &ConversationId) -> std::result::Result<Vec<Message>, StoreError>;

    /// Append messages in one atomic write and bump `updated_at`. If the
    /// conversation has no title and `title` is given, it is set too.
    ///
    /// Fails with `ConversationNotFound` for unknown ids.
    async fn append(
        &self,
        id: &ConversationId,
        messages: &[Message],
        title: Option<&str>,
    ) -> std::result::Result<Conversation, StoreError>;
}
