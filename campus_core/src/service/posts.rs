use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::Utc;
use sea_orm::{sea_query::Expr, Condition, DatabaseConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use zel_core::prelude::*;

use crate::{
    auth::{self, Principal, Viewer},
    config::Settings,
    entity::prelude::*,
    error::{ServiceError, ServiceResult},
    events::{ContentEvent, Dispatcher},
    ids::{CategoryId, PostId, TagId, UserId},
    media::{self, MediaPurpose, MediaStore, Upload},
    pagination::{fetch_page, Page},
    service::{contains_folded, reports::delete_reports_for},
    views::ViewThrottle,
};

const TITLE_MAX: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub category_id: CategoryId,
    /// Comma separated tag names.
    pub tags: Option<String>,
    pub media: Option<Upload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostUpdate {
    pub title: String,
    pub content: String,
    pub category_id: CategoryId,
    /// Replaces the whole tag set. `None` detaches every tag.
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostSort {
    #[default]
    Latest,
    Oldest,
    Popular,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostQuery {
    pub category_id: Option<CategoryId>,
    /// Matches title or content.
    pub search: Option<String>,
    /// Matches any part of a tag name.
    pub tag: Option<String>,
    #[serde(default)]
    pub sort: PostSort,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub post: PostModel,
    pub author_name: String,
    pub category_name: String,
    pub tags: Vec<String>,
    pub like_count: u64,
    pub comment_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDetail {
    pub summary: PostSummary,
    pub liked_by_viewer: bool,
}

/// Split a comma separated tag list, dropping blanks and repeats.
/// Names are compared case-sensitively.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

fn validate_text(title: &str, content: &str) -> ServiceResult<()> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > TITLE_MAX {
        return Err(ServiceError::validation("title must be 1 to 255 characters"));
    }
    if content.trim().is_empty() {
        return Err(ServiceError::validation("content must not be empty"));
    }
    Ok(())
}

async fn ensure_category<C: ConnectionTrait>(db: &C, id: CategoryId) -> ServiceResult<()> {
    Category::find_by_id(id)
        .one(db)
        .await?
        .map(|_| ())
        .ok_or(ServiceError::NotFound("category"))
}

/// Make the post's tag set exactly `names`, creating tags on first use.
async fn sync_tags(txn: &DatabaseTransaction, post_id: PostId, names: &[String]) -> Result<(), DbErr> {
    PostTag::delete_many()
        .filter(PostTagColumn::PostId.eq(post_id))
        .exec(txn)
        .await?;

    let mut links = Vec::with_capacity(names.len());
    for name in names {
        let tag = match Tag::find()
            .filter(TagColumn::Name.eq(name.as_str()))
            .one(txn)
            .await?
        {
            Some(tag) => tag,
            None => {
                TagActiveModel {
                    id: Set(TagId::new()),
                    name: Set(name.clone()),
                }
                .insert(txn)
                .await?
            }
        };
        links.push(PostTagActiveModel {
            post_id: Set(post_id),
            tag_id: Set(tag.id),
        });
    }

    if !links.is_empty() {
        PostTag::insert_many(links).exec(txn).await?;
    }
    Ok(())
}

/// Attach author, category, tags and counters to a batch of posts,
/// keeping the input order.
async fn summarize<C: ConnectionTrait>(db: &C, posts: Vec<PostModel>) -> Result<Vec<PostSummary>, DbErr> {
    if posts.is_empty() {
        return Ok(Vec::new());
    }

    let post_ids: Vec<PostId> = posts.iter().map(|post| post.id).collect();
    let user_ids: Vec<UserId> = posts.iter().map(|post| post.user_id).collect();
    let category_ids: Vec<CategoryId> = posts.iter().map(|post| post.category_id).collect();

    let authors: HashMap<UserId, String> = User::find()
        .filter(UserColumn::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|user| (user.id, user.name))
        .collect();

    let categories: HashMap<CategoryId, String> = Category::find()
        .filter(CategoryColumn::Id.is_in(category_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|category| (category.id, category.name))
        .collect();

    let mut tags: HashMap<PostId, Vec<String>> = HashMap::new();
    for (link, tag) in PostTag::find()
        .filter(PostTagColumn::PostId.is_in(post_ids.clone()))
        .find_also_related(Tag)
        .order_by_asc(TagColumn::Name)
        .all(db)
        .await?
    {
        if let Some(tag) = tag {
            tags.entry(link.post_id).or_default().push(tag.name);
        }
    }

    let likes: HashMap<PostId, i64> = PostLike::find()
        .select_only()
        .column(PostLikeColumn::PostId)
        .column_as(PostLikeColumn::UserId.count(), "count")
        .filter(PostLikeColumn::PostId.is_in(post_ids.clone()))
        .group_by(PostLikeColumn::PostId)
        .into_tuple::<(PostId, i64)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let comments: HashMap<PostId, i64> = Comment::find()
        .select_only()
        .column(CommentColumn::PostId)
        .column_as(CommentColumn::Id.count(), "count")
        .filter(CommentColumn::PostId.is_in(post_ids))
        .group_by(CommentColumn::PostId)
        .into_tuple::<(PostId, i64)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    Ok(posts
        .into_iter()
        .map(|post| PostSummary {
            author_name: authors.get(&post.user_id).cloned().unwrap_or_default(),
            category_name: categories.get(&post.category_id).cloned().unwrap_or_default(),
            tags: tags.remove(&post.id).unwrap_or_default(),
            like_count: likes.get(&post.id).copied().unwrap_or(0) as u64,
            comment_count: comments.get(&post.id).copied().unwrap_or(0) as u64,
            post,
        })
        .collect())
}

#[derive(Clone)]
pub struct PostsService {
    db: DatabaseConnection,
    dispatcher: Dispatcher,
    media: Arc<dyn MediaStore>,
    views: ViewThrottle,
    settings: Settings,
}

impl PostsService {
    pub fn new(
        db: DatabaseConnection,
        dispatcher: Dispatcher,
        media: Arc<dyn MediaStore>,
        settings: Settings,
    ) -> Self {
        Self {
            db,
            dispatcher,
            media,
            views: ViewThrottle::from_minutes(settings.view_window_minutes),
            settings,
        }
    }

    async fn find_post(&self, post_id: PostId) -> ServiceResult<PostModel> {
        Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound("post"))
    }

    pub async fn _create_post(&self, principal: &Principal, new_post: NewPost) -> ServiceResult<PostModel> {
        validate_text(&new_post.title, &new_post.content)?;
        ensure_category(&self.db, new_post.category_id).await?;
        let tags = new_post.tags.as_deref().map(parse_tags).unwrap_or_default();

        let stored = match &new_post.media {
            Some(upload) => Some(self.media.store(MediaPurpose::PostMedia, upload).await?),
            None => None,
        };

        let now = Utc::now();
        let post = PostActiveModel {
            id: Set(PostId::new()),
            user_id: Set(principal.id),
            category_id: Set(new_post.category_id),
            title: Set(new_post.title.trim().to_string()),
            content: Set(new_post.content),
            media_path: Set(stored.as_ref().map(|media| media.path.clone())),
            media_type: Set(stored.as_ref().map(|media| media.kind)),
            views: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = async {
            let txn = self.db.begin().await?;
            let post = post.insert(&txn).await?;
            sync_tags(&txn, post.id, &tags).await?;
            txn.commit().await?;
            Ok::<_, DbErr>(post)
        }
        .await;

        match result {
            Ok(post) => {
                info!(post = %post.id, user = %principal.id, "post created");
                Ok(post)
            }
            Err(err) => {
                if let Some(stored) = stored {
                    media::remove_quietly(self.media.as_ref(), &stored.path).await;
                }
                Err(err.into())
            }
        }
    }

    /// Only the author may edit; admins can delete but not rewrite.
    pub async fn _update_post(
        &self,
        principal: &Principal,
        post_id: PostId,
        update: PostUpdate,
    ) -> ServiceResult<PostModel> {
        let post = self.find_post(post_id).await?;
        if post.user_id != principal.id {
            return Err(ServiceError::Forbidden("not the author of this post"));
        }

        validate_text(&update.title, &update.content)?;
        ensure_category(&self.db, update.category_id).await?;
        let tags = update.tags.as_deref().map(parse_tags).unwrap_or_default();

        let txn = self.db.begin().await?;

        let mut active: PostActiveModel = post.into();
        active.title = Set(update.title.trim().to_string());
        active.content = Set(update.content);
        active.category_id = Set(update.category_id);
        active.updated_at = Set(Utc::now());
        let post = active.update(&txn).await?;

        sync_tags(&txn, post.id, &tags).await?;
        txn.commit().await?;

        info!(post = %post.id, "post updated");
        Ok(post)
    }

    /// Remove a post together with its comments, likes, reports and every
    /// notification that pointed at any of them.
    pub async fn _delete_post(&self, principal: &Principal, post_id: PostId) -> ServiceResult<()> {
        let post = self.find_post(post_id).await?;
        if !principal.can_moderate(post.user_id) {
            return Err(ServiceError::Forbidden("not the author of this post"));
        }

        let txn = self.db.begin().await?;

        let comments = Comment::find()
            .filter(CommentColumn::PostId.eq(post_id))
            .all(&txn)
            .await?;
        let comment_ids: Vec<_> = comments.iter().map(|comment| comment.id).collect();
        let mut reported: Vec<Source> = comment_ids.iter().copied().map(Source::Comment).collect();
        reported.push(Source::Post(post_id));

        for comment in comments {
            self.dispatcher
                .dispatch(&txn, ContentEvent::CommentDeleted(comment))
                .await?;
        }
        self.dispatcher
            .dispatch(&txn, ContentEvent::PostDeleted(post.clone()))
            .await?;

        if !comment_ids.is_empty() {
            CommentLike::delete_many()
                .filter(CommentLikeColumn::CommentId.is_in(comment_ids.clone()))
                .exec(&txn)
                .await?;
            Comment::delete_many()
                .filter(CommentColumn::Id.is_in(comment_ids))
                .exec(&txn)
                .await?;
        }
        PostLike::delete_many()
            .filter(PostLikeColumn::PostId.eq(post_id))
            .exec(&txn)
            .await?;
        PostTag::delete_many()
            .filter(PostTagColumn::PostId.eq(post_id))
            .exec(&txn)
            .await?;
        delete_reports_for(&txn, &reported).await?;
        Post::delete_by_id(post_id).exec(&txn).await?;

        txn.commit().await?;

        if let Some(path) = &post.media_path {
            media::remove_quietly(self.media.as_ref(), path).await;
        }

        info!(post = %post_id, by = %principal.id, "post deleted");
        Ok(())
    }

    /// Post detail. Bumps the view counter at most once per viewer per window.
    pub async fn _get_post(&self, viewer: &Viewer, post_id: PostId) -> ServiceResult<PostDetail> {
        let mut post = self.find_post(post_id).await?;

        if self.views.should_count(viewer, post_id).await {
            Post::update_many()
                .col_expr(PostColumn::Views, Expr::col(PostColumn::Views).add(1))
                .filter(PostColumn::Id.eq(post_id))
                .exec(&self.db)
                .await?;
            post.views += 1;
        }

        let liked_by_viewer = match viewer.user_id() {
            Some(user_id) => PostLike::find_by_id((user_id, post_id))
                .one(&self.db)
                .await?
                .is_some(),
            None => false,
        };

        let summary = summarize(&self.db, vec![post])
            .await?
            .pop()
            .ok_or(ServiceError::NotFound("post"))?;

        Ok(PostDetail {
            summary,
            liked_by_viewer,
        })
    }

    pub async fn _list_posts(&self, query: PostQuery) -> ServiceResult<Page<PostSummary>> {
        let pagination = &self.settings.pagination;
        let per_page = pagination.per_page(query.per_page, pagination.posts);

        let mut select = Post::find();

        if let Some(category_id) = query.category_id {
            select = select.filter(PostColumn::CategoryId.eq(category_id));
        }

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(contains_folded((Post, PostColumn::Title), search))
                    .add(contains_folded((Post, PostColumn::Content), search)),
            );
        }

        if let Some(tag) = query.tag.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let tagged: Vec<PostId> = PostTag::find()
                .select_only()
                .column(PostTagColumn::PostId)
                .inner_join(Tag)
                .filter(contains_folded((Tag, TagColumn::Name), tag))
                .distinct()
                .into_tuple()
                .all(&self.db)
                .await?;
            select = select.filter(PostColumn::Id.is_in(tagged));
        }

        select = match query.sort {
            PostSort::Latest => select
                .order_by_desc(PostColumn::CreatedAt)
                .order_by_desc(PostColumn::Id),
            PostSort::Oldest => select
                .order_by_asc(PostColumn::CreatedAt)
                .order_by_asc(PostColumn::Id),
            PostSort::Popular => select
                .order_by_desc(Expr::cust(
                    "(SELECT COUNT(*) FROM post_like WHERE post_like.post_id = post.id)",
                ))
                .order_by_desc(PostColumn::CreatedAt)
                .order_by_desc(PostColumn::Id),
        };

        let page = fetch_page(select, &self.db, query.page.unwrap_or(1), per_page).await?;
        let items = summarize(&self.db, page.items).await?;

        Ok(Page {
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            items,
        })
    }

    pub async fn _total_likes(&self, post_id: PostId) -> ServiceResult<u64> {
        self.find_post(post_id).await?;

        Ok(PostLike::find()
            .filter(PostLikeColumn::PostId.eq(post_id))
            .count(&self.db)
            .await?)
    }
}

#[zel_service(name = "posts")]
trait Posts {
    #[doc = "Create a post, optionally with tags and one media file"]
    #[method(name = "create_post")]
    async fn create_post(&self, new_post: NewPost) -> Result<PostModel, ResourceError>;

    #[doc = "Edit a post (author only)"]
    #[method(name = "update_post")]
    async fn update_post(&self, post_id: PostId, update: PostUpdate) -> Result<PostModel, ResourceError>;

    #[doc = "Delete a post and everything hanging off it (author or admin)"]
    #[method(name = "delete_post")]
    async fn delete_post(&self, post_id: PostId) -> Result<(), ResourceError>;

    #[doc = "Post detail; counts a view for the caller"]
    #[method(name = "get_post")]
    async fn get_post(&self, post_id: PostId) -> Result<PostDetail, ResourceError>;

    #[doc = "Filtered, sorted and paginated post listing"]
    #[method(name = "list_posts")]
    async fn list_posts(&self, query: PostQuery) -> Result<Page<PostSummary>, ResourceError>;

    #[doc = "Number of likes on a post"]
    #[method(name = "total_likes")]
    async fn total_likes(&self, post_id: PostId) -> Result<u64, ResourceError>;
}

#[async_trait]
impl PostsServer for PostsService {
    async fn create_post(&self, ctx: RequestContext, new_post: NewPost) -> Result<PostModel, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._create_post(&principal, new_post).await?)
    }

    async fn update_post(
        &self,
        ctx: RequestContext,
        post_id: PostId,
        update: PostUpdate,
    ) -> Result<PostModel, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._update_post(&principal, post_id, update).await?)
    }

    async fn delete_post(&self, ctx: RequestContext, post_id: PostId) -> Result<(), ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._delete_post(&principal, post_id).await?)
    }

    async fn get_post(&self, ctx: RequestContext, post_id: PostId) -> Result<PostDetail, ResourceError> {
        let viewer = auth::viewer(&self.db, &ctx).await?;
        Ok(self._get_post(&viewer, post_id).await?)
    }

    async fn list_posts(&self, _ctx: RequestContext, query: PostQuery) -> Result<Page<PostSummary>, ResourceError> {
        Ok(self._list_posts(query).await?)
    }

    async fn total_likes(&self, _ctx: RequestContext, post_id: PostId) -> Result<u64, ResourceError> {
        Ok(self._total_likes(post_id).await?)
    }
}
