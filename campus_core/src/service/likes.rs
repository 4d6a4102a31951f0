use chrono::Utc;
use sea_orm::DatabaseConnection;
use tracing::info;
use zel_core::prelude::*;

use crate::{
    auth::{self, Principal},
    entity::prelude::*,
    error::{ServiceError, ServiceResult},
    events::{ContentEvent, Dispatcher},
    ids::{CommentId, PostId},
};

/// Likes on posts and comments.
///
/// A like is nothing but its row; the composite primary key makes a second
/// like by the same user fail with `Conflict`, and the notification written
/// by the first like is never duplicated because the whole transaction rolls
/// back.
#[derive(Clone)]
pub struct LikesService {
    db: DatabaseConnection,
    dispatcher: Dispatcher,
}

impl LikesService {
    pub fn new(db: DatabaseConnection, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    async fn like_post_in(
        &self,
        txn: &DatabaseTransaction,
        principal: &Principal,
        post_id: PostId,
    ) -> ServiceResult<PostLikeModel> {
        Post::find_by_id(post_id)
            .one(txn)
            .await?
            .ok_or(ServiceError::NotFound("post"))?;

        let like = PostLikeActiveModel {
            user_id: Set(principal.id),
            post_id: Set(post_id),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await
        .map_err(|err| ServiceError::conflict_on_unique(err, "post already liked"))?;

        self.dispatcher
            .dispatch(txn, ContentEvent::PostLiked(like.clone()))
            .await?;
        Ok(like)
    }

    async fn unlike_post_in(&self, txn: &DatabaseTransaction, like: PostLikeModel) -> ServiceResult<()> {
        PostLike::delete_by_id((like.user_id, like.post_id))
            .exec(txn)
            .await?;
        self.dispatcher
            .dispatch(txn, ContentEvent::PostUnliked(like))
            .await?;
        Ok(())
    }

    pub async fn _like_post(&self, principal: &Principal, post_id: PostId) -> ServiceResult<PostLikeModel> {
        let txn = self.db.begin().await?;
        let like = self.like_post_in(&txn, principal, post_id).await?;
        txn.commit().await?;

        info!(post = %post_id, user = %principal.id, "post liked");
        Ok(like)
    }

    pub async fn _unlike_post(&self, principal: &Principal, post_id: PostId) -> ServiceResult<()> {
        let txn = self.db.begin().await?;

        let like = PostLike::find_by_id((principal.id, post_id))
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("like"))?;
        self.unlike_post_in(&txn, like).await?;
        txn.commit().await?;

        info!(post = %post_id, user = %principal.id, "post unliked");
        Ok(())
    }

    /// Like when not liked, unlike otherwise. Returns the new state.
    pub async fn _toggle_post_like(&self, principal: &Principal, post_id: PostId) -> ServiceResult<bool> {
        let txn = self.db.begin().await?;

        let existing = PostLike::find_by_id((principal.id, post_id)).one(&txn).await?;
        let liked = match existing {
            Some(like) => {
                self.unlike_post_in(&txn, like).await?;
                false
            }
            None => {
                self.like_post_in(&txn, principal, post_id).await?;
                true
            }
        };
        txn.commit().await?;

        info!(post = %post_id, user = %principal.id, liked, "post like toggled");
        Ok(liked)
    }

    async fn like_comment_in(
        &self,
        txn: &DatabaseTransaction,
        principal: &Principal,
        comment_id: CommentId,
    ) -> ServiceResult<CommentLikeModel> {
        Comment::find_by_id(comment_id)
            .one(txn)
            .await?
            .ok_or(ServiceError::NotFound("comment"))?;

        let like = CommentLikeActiveModel {
            user_id: Set(principal.id),
            comment_id: Set(comment_id),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await
        .map_err(|err| ServiceError::conflict_on_unique(err, "comment already liked"))?;

        self.dispatcher
            .dispatch(txn, ContentEvent::CommentLiked(like.clone()))
            .await?;
        Ok(like)
    }

    async fn unlike_comment_in(&self, txn: &DatabaseTransaction, like: CommentLikeModel) -> ServiceResult<()> {
        CommentLike::delete_by_id((like.user_id, like.comment_id))
            .exec(txn)
            .await?;
        self.dispatcher
            .dispatch(txn, ContentEvent::CommentUnliked(like))
            .await?;
        Ok(())
    }

    pub async fn _like_comment(
        &self,
        principal: &Principal,
        comment_id: CommentId,
    ) -> ServiceResult<CommentLikeModel> {
        let txn = self.db.begin().await?;
        let like = self.like_comment_in(&txn, principal, comment_id).await?;
        txn.commit().await?;

        info!(comment = %comment_id, user = %principal.id, "comment liked");
        Ok(like)
    }

    pub async fn _unlike_comment(&self, principal: &Principal, comment_id: CommentId) -> ServiceResult<()> {
        let txn = self.db.begin().await?;

        let like = CommentLike::find_by_id((principal.id, comment_id))
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("like"))?;
        self.unlike_comment_in(&txn, like).await?;
        txn.commit().await?;

        info!(comment = %comment_id, user = %principal.id, "comment unliked");
        Ok(())
    }

    pub async fn _toggle_comment_like(
        &self,
        principal: &Principal,
        comment_id: CommentId,
    ) -> ServiceResult<bool> {
        let txn = self.db.begin().await?;

        let existing = CommentLike::find_by_id((principal.id, comment_id)).one(&txn).await?;
        let liked = match existing {
            Some(like) => {
                self.unlike_comment_in(&txn, like).await?;
                false
            }
            None => {
                self.like_comment_in(&txn, principal, comment_id).await?;
                true
            }
        };
        txn.commit().await?;

        info!(comment = %comment_id, user = %principal.id, liked, "comment like toggled");
        Ok(liked)
    }
}

#[zel_service(name = "likes")]
trait Likes {
    #[method(name = "like_post")]
    async fn like_post(&self, post_id: PostId) -> Result<PostLikeModel, ResourceError>;

    #[method(name = "unlike_post")]
    async fn unlike_post(&self, post_id: PostId) -> Result<(), ResourceError>;

    #[doc = "Flip the caller's like on a post; returns whether it is now liked"]
    #[method(name = "toggle_post_like")]
    async fn toggle_post_like(&self, post_id: PostId) -> Result<bool, ResourceError>;

    #[method(name = "like_comment")]
    async fn like_comment(&self, comment_id: CommentId) -> Result<CommentLikeModel, ResourceError>;

    #[method(name = "unlike_comment")]
    async fn unlike_comment(&self, comment_id: CommentId) -> Result<(), ResourceError>;

    #[doc = "Flip the caller's like on a comment; returns whether it is now liked"]
    #[method(name = "toggle_comment_like")]
    async fn toggle_comment_like(&self, comment_id: CommentId) -> Result<bool, ResourceError>;
}

#[async_trait]
impl LikesServer for LikesService {
    async fn like_post(&self, ctx: RequestContext, post_id: PostId) -> Result<PostLikeModel, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._like_post(&principal, post_id).await?)
    }

    async fn unlike_post(&self, ctx: RequestContext, post_id: PostId) -> Result<(), ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._unlike_post(&principal, post_id).await?)
    }

    async fn toggle_post_like(&self, ctx: RequestContext, post_id: PostId) -> Result<bool, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._toggle_post_like(&principal, post_id).await?)
    }

    async fn like_comment(
        &self,
        ctx: RequestContext,
        comment_id: CommentId,
    ) -> Result<CommentLikeModel, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._like_comment(&principal, comment_id).await?)
    }

    async fn unlike_comment(&self, ctx: RequestContext, comment_id: CommentId) -> Result<(), ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._unlike_comment(&principal, comment_id).await?)
    }

    async fn toggle_comment_like(&self, ctx: RequestContext, comment_id: CommentId) -> Result<bool, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._toggle_comment_like(&principal, comment_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    async fn like_post_notifications(db: &DatabaseConnection) -> u64 {
        Notification::find()
            .filter(NotificationColumn::Kind.eq(NotificationKind::LikePost))
            .count(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_like_unlike_round_trip() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let fan = test_utils::principal(&test_utils::create_user(&db, "Fan").await);
        let post = test_utils::create_post(&db, owner.id, "Campus Photo Walk Recap").await;

        services.likes._like_post(&fan, post.id).await.unwrap();
        let notification = Notification::find().one(&db).await.unwrap().unwrap();
        assert_eq!(notification.user_id, owner.id);
        assert_eq!(notification.source(), Source::Post(post.id));
        assert_eq!(notification.message, "Fan liked your post: Campus Photo Walk Re...");

        services.likes._unlike_post(&fan, post.id).await.unwrap();
        assert_eq!(PostLike::find().count(&db).await.unwrap(), 0);
        assert_eq!(like_post_notifications(&db).await, 0);

        assert!(matches!(
            services.likes._unlike_post(&fan, post.id).await,
            Err(ServiceError::NotFound("like"))
        ));
    }

    #[tokio::test]
    async fn test_second_like_conflicts_without_side_effects() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let fan = test_utils::principal(&test_utils::create_user(&db, "Fan").await);
        let post = test_utils::create_post(&db, owner.id, "Post").await;

        services.likes._like_post(&fan, post.id).await.unwrap();
        assert!(matches!(
            services.likes._like_post(&fan, post.id).await,
            Err(ServiceError::Conflict(_))
        ));

        assert_eq!(PostLike::find().count(&db).await.unwrap(), 1);
        assert_eq!(like_post_notifications(&db).await, 1);
        assert_eq!(services.posts._total_likes(post.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unlike_retracts_only_own_like_notification() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let first = test_utils::principal(&test_utils::create_user(&db, "First").await);
        let second = test_utils::principal(&test_utils::create_user(&db, "Second").await);
        let post = test_utils::create_post(&db, owner.id, "Post").await;

        services.likes._like_post(&first, post.id).await.unwrap();
        services.likes._like_post(&second, post.id).await.unwrap();
        services.likes._unlike_post(&first, post.id).await.unwrap();

        let left = Notification::find().all(&db).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].sender_id, second.id);
    }

    #[tokio::test]
    async fn test_self_like_is_silent_and_toggle_flips() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let me = test_utils::principal(&owner);
        let post = test_utils::create_post(&db, owner.id, "Mine").await;
        let comment = services
            .comments
            ._create_comment(&me, post.id, "my own comment".into(), None)
            .await
            .unwrap();

        assert!(services.likes._toggle_post_like(&me, post.id).await.unwrap());
        assert!(services.likes._toggle_comment_like(&me, comment.id).await.unwrap());
        assert_eq!(Notification::find().count(&db).await.unwrap(), 0);

        assert!(!services.likes._toggle_post_like(&me, post.id).await.unwrap());
        assert!(!services.likes._toggle_comment_like(&me, comment.id).await.unwrap());
        assert_eq!(PostLike::find().count(&db).await.unwrap(), 0);
        assert_eq!(CommentLike::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_comment_like_notifies_comment_author() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let author = test_utils::principal(&test_utils::create_user(&db, "Author").await);
        let fan = test_utils::principal(&test_utils::create_user(&db, "Fan").await);
        let post = test_utils::create_post(&db, owner.id, "Post").await;
        let comment = services
            .comments
            ._create_comment(&author, post.id, "Bring snacks to the library".into(), None)
            .await
            .unwrap();

        services.likes._like_comment(&fan, comment.id).await.unwrap();
        let liked = Notification::find()
            .filter(NotificationColumn::Kind.eq(NotificationKind::LikeComment))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(liked.user_id, author.id);
        assert_eq!(liked.source(), Source::Comment(comment.id));
        assert_eq!(liked.message, "Fan liked your comment: Bring snacks to the ...");

        assert!(matches!(
            services.likes._like_comment(&fan, comment.id).await,
            Err(ServiceError::Conflict(_))
        ));

        services.likes._unlike_comment(&fan, comment.id).await.unwrap();
        assert_eq!(
            Notification::find()
                .filter(NotificationColumn::Kind.eq(NotificationKind::LikeComment))
                .count(&db)
                .await
                .unwrap(),
            0
        );
        // the comment_post notification to the owner is untouched
        assert_eq!(Notification::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_toggles_both_flip() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let fan = test_utils::principal(&test_utils::create_user(&db, "Fan").await);
        let post = test_utils::create_post(&db, owner.id, "Double tap").await;

        let (first, second) = tokio::join!(
            services.likes._toggle_post_like(&fan, post.id),
            services.likes._toggle_post_like(&fan, post.id),
        );
        let mut states = vec![first.unwrap(), second.unwrap()];
        states.sort();

        assert_eq!(states, vec![false, true]);
        assert_eq!(PostLike::find().count(&db).await.unwrap(), 0);
        assert_eq!(like_post_notifications(&db).await, 0);
    }
}
