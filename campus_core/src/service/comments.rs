use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{prelude::DateTimeUtc, sea_query::Expr, DatabaseConnection, FromQueryResult};
use serde::{Deserialize, Serialize};
use tracing::info;
use zel_core::prelude::*;

use crate::{
    auth::{self, Principal},
    config::Settings,
    entity::prelude::*,
    error::{ServiceError, ServiceResult},
    events::{ContentEvent, Dispatcher},
    ids::{CommentId, PostId, UserId},
    pagination::{fetch_page, Page},
    service::{contains_folded, reports::delete_reports_for},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    pub comment: CommentModel,
    pub author_name: String,
    pub like_count: u64,
    pub replies: Vec<CommentNode>,
    /// Replies exist below this node but were cut by the depth limit.
    pub has_more_replies: bool,
}

/// Flat comment row joined with its post title, author name and like count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDetail {
    pub id: CommentId,
    pub post_id: PostId,
    pub post_title: String,
    pub user_id: UserId,
    pub commenter_name: String,
    pub parent_comment_id: Option<CommentId>,
    pub content: String,
    pub like_count: u64,
    pub created_at: DateTimeUtc,
}

// sqlite hands COUNT(*) back as a signed integer
#[derive(Debug, FromQueryResult)]
struct CommentDetailRow {
    id: CommentId,
    post_id: PostId,
    post_title: String,
    user_id: UserId,
    commenter_name: String,
    parent_comment_id: Option<CommentId>,
    content: String,
    like_count: i64,
    created_at: DateTimeUtc,
}

impl From<CommentDetailRow> for CommentDetail {
    fn from(row: CommentDetailRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            post_title: row.post_title,
            user_id: row.user_id,
            commenter_name: row.commenter_name,
            parent_comment_id: row.parent_comment_id,
            content: row.content,
            like_count: row.like_count.max(0) as u64,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentDetailQuery {
    pub post_id: Option<PostId>,
    /// Substring of the commenter's name.
    pub author_name: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Assemble reply trees from a flat list of one post's comments.
///
/// `comments` must be ordered oldest first; siblings keep that order.
/// Top-level comments sit at depth 0 and nothing deeper than `max_depth` is
/// returned. Works level by level and then folds the levels back up, so
/// thread depth never turns into stack depth.
pub fn build_tree(
    comments: Vec<CommentModel>,
    names: &HashMap<UserId, String>,
    likes: &HashMap<CommentId, i64>,
    max_depth: usize,
) -> Vec<CommentNode> {
    let mut children: HashMap<Option<CommentId>, Vec<CommentModel>> = HashMap::new();
    for comment in comments {
        children.entry(comment.parent_comment_id).or_default().push(comment);
    }

    // breadth-first, remembering each node's depth
    let mut order: Vec<(CommentModel, usize)> = Vec::new();
    let mut frontier: Vec<CommentModel> = children.remove(&None).unwrap_or_default();
    let mut depth = 0;
    while !frontier.is_empty() && depth <= max_depth {
        let mut next = Vec::new();
        for comment in frontier {
            if depth < max_depth {
                if let Some(replies) = children.get(&Some(comment.id)) {
                    next.extend(replies.iter().cloned());
                }
            }
            order.push((comment, depth));
        }
        frontier = next;
        depth += 1;
    }

    let mut built: HashMap<CommentId, CommentNode> = HashMap::new();
    let mut roots = Vec::new();

    for (comment, depth) in order.into_iter().rev() {
        let reply_ids: Vec<CommentId> = children
            .get(&Some(comment.id))
            .map(|replies| replies.iter().map(|reply| reply.id).collect())
            .unwrap_or_default();

        let (replies, has_more_replies) = if depth < max_depth {
            let replies = reply_ids
                .iter()
                .filter_map(|id| built.remove(id))
                .collect();
            (replies, false)
        } else {
            (Vec::new(), !reply_ids.is_empty())
        };

        let node = CommentNode {
            author_name: names.get(&comment.user_id).cloned().unwrap_or_default(),
            like_count: likes.get(&comment.id).copied().unwrap_or(0) as u64,
            replies,
            has_more_replies,
            comment,
        };

        if depth == 0 {
            roots.push(node);
        } else {
            built.insert(node.comment.id, node);
        }
    }

    roots.reverse();
    roots
}

#[derive(Clone)]
pub struct CommentsService {
    db: DatabaseConnection,
    dispatcher: Dispatcher,
    settings: Settings,
}

impl CommentsService {
    pub fn new(db: DatabaseConnection, dispatcher: Dispatcher, settings: Settings) -> Self {
        Self {
            db,
            dispatcher,
            settings,
        }
    }

    /// Comment on a post, or reply to a comment on the same post.
    pub async fn _create_comment(
        &self,
        principal: &Principal,
        post_id: PostId,
        content: String,
        parent_comment_id: Option<CommentId>,
    ) -> ServiceResult<CommentModel> {
        if content.trim().is_empty() {
            return Err(ServiceError::validation("comment must not be empty"));
        }

        let txn = self.db.begin().await?;

        Post::find_by_id(post_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("post"))?;

        if let Some(parent_id) = parent_comment_id {
            let parent = Comment::find_by_id(parent_id)
                .one(&txn)
                .await?
                .ok_or(ServiceError::NotFound("parent comment"))?;
            if parent.post_id != post_id {
                return Err(ServiceError::validation(
                    "parent comment belongs to a different post",
                ));
            }
        }

        let comment = CommentActiveModel {
            id: Set(CommentId::new()),
            user_id: Set(principal.id),
            post_id: Set(post_id),
            parent_comment_id: Set(parent_comment_id),
            content: Set(content),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        self.dispatcher
            .dispatch(&txn, ContentEvent::CommentCreated(comment.clone()))
            .await?;

        txn.commit().await?;

        info!(comment = %comment.id, post = %post_id, "comment created");
        Ok(comment)
    }

    /// Delete a comment and its whole reply subtree. Returns how many
    /// comments were removed.
    pub async fn _delete_comment(&self, principal: &Principal, comment_id: CommentId) -> ServiceResult<u64> {
        let txn = self.db.begin().await?;

        let root = Comment::find_by_id(comment_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("comment"))?;
        if !principal.can_moderate(root.user_id) {
            return Err(ServiceError::Forbidden("not the author of this comment"));
        }

        let mut subtree = vec![root];
        let mut level: Vec<CommentId> = vec![comment_id];
        while !level.is_empty() {
            let replies = Comment::find()
                .filter(CommentColumn::ParentCommentId.is_in(level))
                .all(&txn)
                .await?;
            level = replies.iter().map(|reply| reply.id).collect();
            subtree.extend(replies);
        }

        let ids: Vec<CommentId> = subtree.iter().map(|comment| comment.id).collect();
        let reported: Vec<Source> = ids.iter().copied().map(Source::Comment).collect();

        // deepest first
        for comment in subtree.into_iter().rev() {
            self.dispatcher
                .dispatch(&txn, ContentEvent::CommentDeleted(comment))
                .await?;
        }

        CommentLike::delete_many()
            .filter(CommentLikeColumn::CommentId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        delete_reports_for(&txn, &reported).await?;
        let removed = Comment::delete_many()
            .filter(CommentColumn::Id.is_in(ids))
            .exec(&txn)
            .await?
            .rows_affected;

        txn.commit().await?;

        info!(comment = %comment_id, removed, by = %principal.id, "comment deleted");
        Ok(removed)
    }

    pub async fn _comment_tree(&self, post_id: PostId) -> ServiceResult<Vec<CommentNode>> {
        Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound("post"))?;

        let comments = Comment::find()
            .filter(CommentColumn::PostId.eq(post_id))
            .order_by_asc(CommentColumn::CreatedAt)
            .order_by_asc(CommentColumn::Id)
            .all(&self.db)
            .await?;

        let user_ids: Vec<UserId> = comments.iter().map(|comment| comment.user_id).collect();
        let names: HashMap<UserId, String> = User::find()
            .filter(UserColumn::Id.is_in(user_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|user| (user.id, user.name))
            .collect();

        let comment_ids: Vec<CommentId> = comments.iter().map(|comment| comment.id).collect();
        let likes: HashMap<CommentId, i64> = CommentLike::find()
            .select_only()
            .column(CommentLikeColumn::CommentId)
            .column_as(CommentLikeColumn::UserId.count(), "count")
            .filter(CommentLikeColumn::CommentId.is_in(comment_ids))
            .group_by(CommentLikeColumn::CommentId)
            .into_tuple::<(CommentId, i64)>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();

        Ok(build_tree(
            comments,
            &names,
            &likes,
            self.settings.comment_tree_max_depth,
        ))
    }

    pub async fn _search_comment_details(
        &self,
        query: CommentDetailQuery,
    ) -> ServiceResult<Page<CommentDetail>> {
        let pagination = &self.settings.pagination;
        let per_page = pagination.per_page(query.per_page, pagination.comment_details);

        let mut select = Comment::find()
            .select_only()
            .column(CommentColumn::Id)
            .column(CommentColumn::PostId)
            .column_as(PostColumn::Title, "post_title")
            .column(CommentColumn::UserId)
            .column_as(UserColumn::Name, "commenter_name")
            .column(CommentColumn::ParentCommentId)
            .column(CommentColumn::Content)
            .column_as(
                Expr::cust(
                    "(SELECT COUNT(*) FROM comment_like WHERE comment_like.comment_id = comment.id)",
                ),
                "like_count",
            )
            .column(CommentColumn::CreatedAt)
            .inner_join(Post)
            .inner_join(User);

        if let Some(post_id) = query.post_id {
            select = select.filter(CommentColumn::PostId.eq(post_id));
        }
        if let Some(name) = query.author_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(contains_folded((User, UserColumn::Name), name));
        }

        let select = select
            .order_by_asc(CommentColumn::CreatedAt)
            .order_by_asc(CommentColumn::Id)
            .into_model::<CommentDetailRow>();

        let page = fetch_page(select, &self.db, query.page.unwrap_or(1), per_page).await?;
        Ok(page.map(CommentDetail::from))
    }
}

#[zel_service(name = "comments")]
trait Comments {
    #[doc = "Comment on a post, or reply to one of its comments"]
    #[method(name = "create_comment")]
    async fn create_comment(
        &self,
        post_id: PostId,
        content: String,
        parent_comment_id: Option<CommentId>,
    ) -> Result<CommentModel, ResourceError>;

    #[doc = "Delete a comment and all replies below it (author or admin)"]
    #[method(name = "delete_comment")]
    async fn delete_comment(&self, comment_id: CommentId) -> Result<u64, ResourceError>;

    #[doc = "Threaded comments of a post, oldest first"]
    #[method(name = "comment_tree")]
    async fn comment_tree(&self, post_id: PostId) -> Result<Vec<CommentNode>, ResourceError>;

    #[doc = "Flat, paginated comment listing with post and author details"]
    #[method(name = "search_comment_details")]
    async fn search_comment_details(
        &self,
        query: CommentDetailQuery,
    ) -> Result<Page<CommentDetail>, ResourceError>;
}

#[async_trait]
impl CommentsServer for CommentsService {
    async fn create_comment(
        &self,
        ctx: RequestContext,
        post_id: PostId,
        content: String,
        parent_comment_id: Option<CommentId>,
    ) -> Result<CommentModel, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self
            ._create_comment(&principal, post_id, content, parent_comment_id)
            .await?)
    }

    async fn delete_comment(&self, ctx: RequestContext, comment_id: CommentId) -> Result<u64, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._delete_comment(&principal, comment_id).await?)
    }

    async fn comment_tree(&self, _ctx: RequestContext, post_id: PostId) -> Result<Vec<CommentNode>, ResourceError> {
        Ok(self._comment_tree(post_id).await?)
    }

    async fn search_comment_details(
        &self,
        _ctx: RequestContext,
        query: CommentDetailQuery,
    ) -> Result<Page<CommentDetail>, ResourceError> {
        Ok(self._search_comment_details(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        events::{EventHandler, NotificationEngine},
        test_utils,
    };

    async fn notifications_for(db: &DatabaseConnection, user: UserId) -> Vec<NotificationModel> {
        Notification::find()
            .filter(NotificationColumn::UserId.eq(user))
            .order_by_asc(NotificationColumn::CreatedAt)
            .all(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_midterm_review_scenario() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let a = test_utils::create_user(&db, "A").await;
        let b = test_utils::principal(&test_utils::create_user(&db, "B").await);
        let c = test_utils::principal(&test_utils::create_user(&db, "C").await);
        let post = test_utils::create_post(&db, a.id, "Midterm Review Session Notes").await;

        let great = services
            .comments
            ._create_comment(&b, post.id, "Great notes!".into(), None)
            .await
            .unwrap();

        let to_a = notifications_for(&db, a.id).await;
        assert_eq!(to_a.len(), 1);
        assert_eq!(to_a[0].sender_id, b.id);
        assert_eq!(to_a[0].kind, NotificationKind::CommentPost);
        assert_eq!(to_a[0].source(), Source::Comment(great.id));
        assert_eq!(
            to_a[0].message,
            "B commented on your post: Midterm Review Sessi..."
        );

        let reply = services
            .comments
            ._create_comment(&c, post.id, "Thanks!".into(), Some(great.id))
            .await
            .unwrap();
        assert_eq!(notifications_for(&db, a.id).await.len(), 2);
        let to_b = notifications_for(&db, b.id).await;
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0].kind, NotificationKind::ReplyComment);

        // B's comment goes, and with it the reply below it
        let removed = services.comments._delete_comment(&b, great.id).await.unwrap();
        assert_eq!(removed, 2);
        assert!(Comment::find_by_id(reply.id).one(&db).await.unwrap().is_none());
        assert_eq!(Notification::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reply_fan_out_matrix() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::principal(&test_utils::create_user(&db, "owner").await);
        let parent_author = test_utils::principal(&test_utils::create_user(&db, "parent").await);
        let third = test_utils::principal(&test_utils::create_user(&db, "third").await);
        let post = test_utils::create_post(&db, owner.id, "Thread").await;
        let parent = services
            .comments
            ._create_comment(&parent_author, post.id, "top".into(), None)
            .await
            .unwrap();

        let count_for = |comment: CommentModel| {
            let db = db.clone();
            async move {
                Notification::find()
                    .filter(NotificationColumn::SourceKind.eq(SourceKind::Comment))
                    .filter(NotificationColumn::SourceId.eq(comment.id.into_uuid()))
                    .all(&db)
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|n| n.kind)
                    .collect::<Vec<_>>()
            }
        };

        // stranger: post owner and parent author both hear about it
        let reply = services
            .comments
            ._create_comment(&third, post.id, "r1".into(), Some(parent.id))
            .await
            .unwrap();
        let mut kinds = count_for(reply).await;
        kinds.sort_by_key(|kind| format!("{kind:?}"));
        assert_eq!(kinds, vec![NotificationKind::CommentPost, NotificationKind::ReplyComment]);

        // post owner replying: only the parent author
        let reply = services
            .comments
            ._create_comment(&owner, post.id, "r2".into(), Some(parent.id))
            .await
            .unwrap();
        assert_eq!(count_for(reply).await, vec![NotificationKind::ReplyComment]);

        // parent author replying to themself: only the post owner
        let reply = services
            .comments
            ._create_comment(&parent_author, post.id, "r3".into(), Some(parent.id))
            .await
            .unwrap();
        assert_eq!(count_for(reply).await, vec![NotificationKind::CommentPost]);

        // owner commenting on their own post: nothing
        let own = services
            .comments
            ._create_comment(&owner, post.id, "bump".into(), None)
            .await
            .unwrap();
        assert!(count_for(own).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_only_that_comments_notifications() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "owner").await;
        let b = test_utils::principal(&test_utils::create_user(&db, "B").await);
        let post = test_utils::create_post(&db, owner.id, "Thread").await;

        let first = services.comments._create_comment(&b, post.id, "1".into(), None).await.unwrap();
        let second = services.comments._create_comment(&b, post.id, "2".into(), None).await.unwrap();

        services.comments._delete_comment(&b, first.id).await.unwrap();

        let left = Notification::find().all(&db).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].source(), Source::Comment(second.id));
    }

    #[tokio::test]
    async fn test_comment_rules() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "owner").await;
        let b = test_utils::principal(&test_utils::create_user(&db, "B").await);
        let stranger = test_utils::principal(&test_utils::create_user(&db, "stranger").await);
        let admin = test_utils::principal(&test_utils::create_admin(&db, "admin").await);
        let post = test_utils::create_post(&db, owner.id, "One").await;
        let other_post = test_utils::create_post(&db, owner.id, "Two").await;

        assert!(matches!(
            services.comments._create_comment(&b, post.id, "   ".into(), None).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            services.comments._create_comment(&b, PostId::new(), "hi".into(), None).await,
            Err(ServiceError::NotFound("post"))
        ));

        let comment = services.comments._create_comment(&b, post.id, "hi".into(), None).await.unwrap();
        assert!(matches!(
            services
                .comments
                ._create_comment(&b, other_post.id, "cross".into(), Some(comment.id))
                .await,
            Err(ServiceError::Validation(_))
        ));

        assert!(matches!(
            services.comments._delete_comment(&stranger, comment.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert_eq!(services.comments._delete_comment(&admin, comment.id).await.unwrap(), 1);
        assert!(matches!(
            services.comments._delete_comment(&admin, comment.id).await,
            Err(ServiceError::NotFound("comment"))
        ));
    }

    struct Refuse;

    #[async_trait]
    impl EventHandler for Refuse {
        fn name(&self) -> &'static str {
            "refuse"
        }

        async fn handle(&self, _txn: &DatabaseTransaction, _event: &ContentEvent) -> Result<(), DbErr> {
            Err(DbErr::Custom("nope".into()))
        }
    }

    #[tokio::test]
    async fn test_failing_handler_rolls_back_comment() {
        let db = test_utils::create_test_db().await;
        let owner = test_utils::create_user(&db, "owner").await;
        let b = test_utils::principal(&test_utils::create_user(&db, "B").await);
        let post = test_utils::create_post(&db, owner.id, "Fragile").await;

        let dispatcher = Dispatcher::new().register(NotificationEngine).register(Refuse);
        let comments = CommentsService::new(db.clone(), dispatcher, Settings::default());

        assert!(comments._create_comment(&b, post.id, "hi".into(), None).await.is_err());
        assert_eq!(Comment::find().count(&db).await.unwrap(), 0);
        assert_eq!(Notification::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tree_and_details() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "owner").await;
        let alice = test_utils::principal(&test_utils::create_user(&db, "Alice").await);
        let bob = test_utils::principal(&test_utils::create_user(&db, "Bob").await);
        let post = test_utils::create_post(&db, owner.id, "Tree").await;

        let top = services.comments._create_comment(&alice, post.id, "top".into(), None).await.unwrap();
        let reply = services
            .comments
            ._create_comment(&bob, post.id, "reply".into(), Some(top.id))
            .await
            .unwrap();
        services
            .comments
            ._create_comment(&alice, post.id, "nested".into(), Some(reply.id))
            .await
            .unwrap();
        services.comments._create_comment(&bob, post.id, "second".into(), None).await.unwrap();
        services.likes._like_comment(&bob, top.id).await.unwrap();

        let tree = services.comments._comment_tree(post.id).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].comment.id, top.id);
        assert_eq!(tree[0].author_name, "Alice");
        assert_eq!(tree[0].like_count, 1);
        assert_eq!(tree[0].replies[0].comment.id, reply.id);
        assert_eq!(tree[0].replies[0].replies[0].comment.content, "nested");
        assert_eq!(tree[1].comment.content, "second");

        let by_bob = services
            .comments
            ._search_comment_details(CommentDetailQuery {
                post_id: Some(post.id),
                author_name: Some("bo".into()),
                ..CommentDetailQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_bob.total, 2);
        assert_eq!(by_bob.per_page, 100);
        assert_eq!(by_bob.items[0].content, "reply");
        assert_eq!(by_bob.items[0].post_title, "Tree");
        assert_eq!(by_bob.items[0].commenter_name, "Bob");

        let shouted = services
            .comments
            ._search_comment_details(CommentDetailQuery {
                author_name: Some("BOB".into()),
                ..CommentDetailQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(shouted.total, 2);

        let wildcard = services
            .comments
            ._search_comment_details(CommentDetailQuery {
                author_name: Some("%".into()),
                ..CommentDetailQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(wildcard.total, 0);

        let all = services
            .comments
            ._search_comment_details(CommentDetailQuery::default())
            .await
            .unwrap();
        assert_eq!(all.total, 4);
        assert_eq!(all.items[0].like_count, 1);
        assert_eq!(all.items[0].like_count, tree[0].like_count);
    }

    #[test]
    fn test_build_tree_cuts_at_max_depth() {
        let post_id = PostId::new();
        let author = UserId::new();
        let mut chain = Vec::new();
        let mut parent = None;
        for depth in 0..5 {
            let comment = CommentModel {
                id: CommentId::new(),
                user_id: author,
                post_id,
                parent_comment_id: parent,
                content: format!("level {depth}"),
                created_at: Utc::now(),
            };
            parent = Some(comment.id);
            chain.push(comment);
        }

        let tree = build_tree(chain, &HashMap::new(), &HashMap::new(), 2);

        assert_eq!(tree.len(), 1);
        let level1 = &tree[0].replies[0];
        let level2 = &level1.replies[0];
        assert_eq!(level2.comment.content, "level 2");
        assert!(level2.replies.is_empty());
        assert!(level2.has_more_replies);
        assert!(!level1.has_more_replies);
    }
}
