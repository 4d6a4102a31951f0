//! In-process content events.
//!
//! Services publish a [`ContentEvent`] after every mutation that can fan out
//! or retract notifications. Handlers receive the caller's open
//! [`DatabaseTransaction`], so whatever they write commits or rolls back
//! together with the mutation that produced the event.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseTransaction, DbErr};
use tracing::debug;

use crate::entity::prelude::*;

mod notifier;

pub use notifier::{preview, NotificationEngine};

#[derive(Debug, Clone)]
pub enum ContentEvent {
    CommentCreated(CommentModel),
    CommentDeleted(CommentModel),
    PostLiked(PostLikeModel),
    PostUnliked(PostLikeModel),
    CommentLiked(CommentLikeModel),
    CommentUnliked(CommentLikeModel),
    PostDeleted(PostModel),
}

impl ContentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ContentEvent::CommentCreated(_) => "comment_created",
            ContentEvent::CommentDeleted(_) => "comment_deleted",
            ContentEvent::PostLiked(_) => "post_liked",
            ContentEvent::PostUnliked(_) => "post_unliked",
            ContentEvent::CommentLiked(_) => "comment_liked",
            ContentEvent::CommentUnliked(_) => "comment_unliked",
            ContentEvent::PostDeleted(_) => "post_deleted",
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, txn: &DatabaseTransaction, event: &ContentEvent) -> Result<(), DbErr>;
}

/// Fans an event out to every registered handler, in registration order.
/// The first handler error aborts the dispatch and is returned to the caller,
/// which then drops its transaction.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dispatcher every service uses in production.
    pub fn with_notifications() -> Self {
        Self::new().register(NotificationEngine)
    }

    pub fn register(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub async fn dispatch(&self, txn: &DatabaseTransaction, event: ContentEvent) -> Result<(), DbErr> {
        for handler in &self.handlers {
            debug!(handler = handler.name(), event = event.name(), "dispatching");
            handler.handle(txn, &event).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|handler| handler.name()))
            .finish()
    }
}
