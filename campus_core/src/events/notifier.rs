use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, Set,
};
use tracing::debug;

use super::{ContentEvent, EventHandler};
use crate::{
    entity::prelude::*,
    ids::{NotificationId, PostId, UserId},
};

const PREVIEW_CHARS: usize = 20;

/// First 20 characters of `text` followed by `...`.
///
/// The ellipsis is appended even when nothing was cut.
pub fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    out.push_str("...");
    out
}

/// Derives notification rows from content events and retracts them when the
/// triggering action is undone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationEngine;

#[async_trait]
impl EventHandler for NotificationEngine {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn handle(&self, txn: &DatabaseTransaction, event: &ContentEvent) -> Result<(), DbErr> {
        match event {
            ContentEvent::CommentCreated(comment) => on_comment_created(txn, comment).await,
            ContentEvent::CommentDeleted(comment) => {
                retract_source(txn, Source::Comment(comment.id)).await
            }
            ContentEvent::PostLiked(like) => on_post_liked(txn, like).await,
            ContentEvent::PostUnliked(like) => {
                retract_like(
                    txn,
                    Source::Post(like.post_id),
                    like.user_id,
                    NotificationKind::LikePost,
                )
                .await
            }
            ContentEvent::CommentLiked(like) => on_comment_liked(txn, like).await,
            ContentEvent::CommentUnliked(like) => {
                retract_like(
                    txn,
                    Source::Comment(like.comment_id),
                    like.user_id,
                    NotificationKind::LikeComment,
                )
                .await
            }
            ContentEvent::PostDeleted(post) => retract_source(txn, Source::Post(post.id)).await,
        }
    }
}

struct Outgoing {
    recipient: UserId,
    sender: UserId,
    kind: NotificationKind,
    source: Source,
    message: String,
}

async fn notify(txn: &DatabaseTransaction, outgoing: Outgoing) -> Result<(), DbErr> {
    if outgoing.recipient == outgoing.sender {
        return Ok(());
    }

    let (source_kind, source_id) = outgoing.source.into_parts();

    NotificationActiveModel {
        id: Set(NotificationId::new()),
        user_id: Set(outgoing.recipient),
        sender_id: Set(outgoing.sender),
        kind: Set(outgoing.kind),
        source_kind: Set(source_kind),
        source_id: Set(source_id),
        message: Set(outgoing.message),
        is_read: Set(false),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    debug!(recipient = %outgoing.recipient, kind = ?outgoing.kind, "notification created");
    Ok(())
}

async fn user_name(txn: &DatabaseTransaction, id: UserId) -> Result<String, DbErr> {
    User::find_by_id(id)
        .one(txn)
        .await?
        .map(|user| user.name)
        .ok_or_else(|| DbErr::RecordNotFound(format!("user {id}")))
}

async fn load_post(txn: &DatabaseTransaction, id: PostId) -> Result<PostModel, DbErr> {
    Post::find_by_id(id)
        .one(txn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("post {id}")))
}

async fn on_comment_created(txn: &DatabaseTransaction, comment: &CommentModel) -> Result<(), DbErr> {
    let post = load_post(txn, comment.post_id).await?;
    let author = user_name(txn, comment.user_id).await?;

    notify(
        txn,
        Outgoing {
            recipient: post.user_id,
            sender: comment.user_id,
            kind: NotificationKind::CommentPost,
            source: Source::Comment(comment.id),
            message: format!("{author} commented on your post: {}", preview(&post.title)),
        },
    )
    .await?;

    if let Some(parent_id) = comment.parent_comment_id {
        let parent = Comment::find_by_id(parent_id)
            .one(txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("comment {parent_id}")))?;

        notify(
            txn,
            Outgoing {
                recipient: parent.user_id,
                sender: comment.user_id,
                kind: NotificationKind::ReplyComment,
                source: Source::Comment(comment.id),
                message: format!(
                    "{author} replied to your comment in: {}",
                    preview(&post.title)
                ),
            },
        )
        .await?;
    }

    Ok(())
}

async fn on_post_liked(txn: &DatabaseTransaction, like: &PostLikeModel) -> Result<(), DbErr> {
    let post = load_post(txn, like.post_id).await?;
    let liker = user_name(txn, like.user_id).await?;

    notify(
        txn,
        Outgoing {
            recipient: post.user_id,
            sender: like.user_id,
            kind: NotificationKind::LikePost,
            source: Source::Post(post.id),
            message: format!("{liker} liked your post: {}", preview(&post.title)),
        },
    )
    .await
}

async fn on_comment_liked(txn: &DatabaseTransaction, like: &CommentLikeModel) -> Result<(), DbErr> {
    let comment = Comment::find_by_id(like.comment_id)
        .one(txn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("comment {}", like.comment_id)))?;
    let liker = user_name(txn, like.user_id).await?;

    notify(
        txn,
        Outgoing {
            recipient: comment.user_id,
            sender: like.user_id,
            kind: NotificationKind::LikeComment,
            source: Source::Comment(comment.id),
            message: format!("{liker} liked your comment: {}", preview(&comment.content)),
        },
    )
    .await
}

/// Every notification pointing at `source`, whatever its kind or sender.
async fn retract_source(txn: &DatabaseTransaction, source: Source) -> Result<(), DbErr> {
    let (kind, id) = source.into_parts();

    let deleted = Notification::delete_many()
        .filter(NotificationColumn::SourceKind.eq(kind))
        .filter(NotificationColumn::SourceId.eq(id))
        .exec(txn)
        .await?;

    debug!(?source, removed = deleted.rows_affected, "notifications retracted");
    Ok(())
}

async fn retract_like(
    txn: &DatabaseTransaction,
    source: Source,
    sender: UserId,
    kind: NotificationKind,
) -> Result<(), DbErr> {
    let (source_kind, source_id) = source.into_parts();

    let deleted = Notification::delete_many()
        .filter(NotificationColumn::SourceKind.eq(source_kind))
        .filter(NotificationColumn::SourceId.eq(source_id))
        .filter(NotificationColumn::SenderId.eq(sender))
        .filter(NotificationColumn::Kind.eq(kind))
        .exec(txn)
        .await?;

    debug!(?source, removed = deleted.rows_affected, "like notification retracted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use sea_orm::{PaginatorTrait, TransactionTrait};

    use super::*;
    use crate::{events::Dispatcher, ids::CommentId, test_utils};

    #[test]
    fn test_preview_counts_characters() {
        assert_eq!(
            preview("Midterm Review Session Notes"),
            "Midterm Review Sessi..."
        );
        assert_eq!(preview("Short"), "Short...");
        assert_eq!(preview("ééééééééééééééééééééé"), "éééééééééééééééééééé...");
    }

    fn comment(author: UserId, post: &PostModel, parent: Option<CommentId>, text: &str) -> CommentActiveModel {
        CommentActiveModel {
            id: Set(CommentId::new()),
            user_id: Set(author),
            post_id: Set(post.id),
            parent_comment_id: Set(parent),
            content: Set(text.to_string()),
            created_at: Set(Utc::now()),
        }
    }

    async fn insert_and_dispatch(
        db: &sea_orm::DatabaseConnection,
        comment: CommentActiveModel,
    ) -> CommentModel {
        let txn = db.begin().await.unwrap();
        let stored = comment.insert(&txn).await.unwrap();
        Dispatcher::with_notifications()
            .dispatch(&txn, ContentEvent::CommentCreated(stored.clone()))
            .await
            .unwrap();
        txn.commit().await.unwrap();
        stored
    }

    #[tokio::test]
    async fn test_comment_and_reply_fan_out() {
        let db = test_utils::create_test_db().await;
        let a = test_utils::create_user(&db, "A").await;
        let b = test_utils::create_user(&db, "B").await;
        let c = test_utils::create_user(&db, "C").await;
        let post = test_utils::create_post(&db, a.id, "Midterm Review Session Notes").await;

        let top = insert_and_dispatch(&db, comment(b.id, &post, None, "Great notes!")).await;
        insert_and_dispatch(&db, comment(c.id, &post, Some(top.id), "Agreed")).await;

        let to_a = Notification::find()
            .filter(NotificationColumn::UserId.eq(a.id))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(to_a.len(), 2);
        assert!(to_a
            .iter()
            .any(|n| n.message == "B commented on your post: Midterm Review Sessi..."));

        let to_b = Notification::find()
            .filter(NotificationColumn::UserId.eq(b.id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(to_b.kind, NotificationKind::ReplyComment);
        assert_eq!(to_b.sender_id, c.id);
        assert_eq!(
            to_b.message,
            "C replied to your comment in: Midterm Review Sessi..."
        );
    }

    #[tokio::test]
    async fn test_retraction_matches_exact_source() {
        let db = test_utils::create_test_db().await;
        let a = test_utils::create_user(&db, "A").await;
        let b = test_utils::create_user(&db, "B").await;
        let post = test_utils::create_post(&db, a.id, "Notes").await;

        let first = insert_and_dispatch(&db, comment(b.id, &post, None, "one")).await;
        insert_and_dispatch(&db, comment(b.id, &post, None, "two")).await;

        let txn = db.begin().await.unwrap();
        NotificationEngine
            .handle(&txn, &ContentEvent::CommentDeleted(first.clone()))
            .await
            .unwrap();
        txn.commit().await.unwrap();

        let remaining = Notification::find().all(&db).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].source(), Source::Comment(first.id));
    }

    #[tokio::test]
    async fn test_self_comment_is_silent() {
        let db = test_utils::create_test_db().await;
        let a = test_utils::create_user(&db, "A").await;
        let post = test_utils::create_post(&db, a.id, "Notes").await;

        let top = insert_and_dispatch(&db, comment(a.id, &post, None, "bump")).await;
        insert_and_dispatch(&db, comment(a.id, &post, Some(top.id), "bump again")).await;

        assert_eq!(Notification::find().count(&db).await.unwrap(), 0);
    }
}
