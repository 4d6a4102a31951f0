//! Request handling. Each service exposes its operations as `_method`
//! functions taking an explicit caller, plus a `zel_service` RPC trait whose
//! server half resolves the caller from the connection and delegates.

use std::sync::Arc;

use sea_orm::{
    sea_query::{Expr, Func, IntoColumnRef, LikeExpr, SimpleExpr},
    DatabaseConnection,
};

use crate::{config::Settings, events::Dispatcher, media::MediaStore};

pub mod accounts;
pub mod catalog;
pub mod comments;
pub mod likes;
pub mod notifications;
pub mod posts;
pub mod reports;

const LIKE_ESCAPE: char = '\\';

/// Every service, wired to one database, dispatcher and media store.
#[derive(Clone)]
pub struct Services {
    pub accounts: accounts::AccountsService,
    pub posts: posts::PostsService,
    pub comments: comments::CommentsService,
    pub likes: likes::LikesService,
    pub notifications: notifications::NotificationsService,
    pub reports: reports::ReportsService,
    pub catalog: catalog::CatalogService,
}

impl Services {
    pub fn new(
        db: DatabaseConnection,
        settings: &Settings,
        dispatcher: Dispatcher,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            accounts: accounts::AccountsService::new(db.clone(), media.clone()),
            posts: posts::PostsService::new(
                db.clone(),
                dispatcher.clone(),
                media,
                settings.clone(),
            ),
            comments: comments::CommentsService::new(db.clone(), dispatcher.clone(), settings.clone()),
            likes: likes::LikesService::new(db.clone(), dispatcher),
            notifications: notifications::NotificationsService::new(db.clone(), settings.clone()),
            reports: reports::ReportsService::new(db.clone(), settings.clone()),
            catalog: catalog::CatalogService::new(db),
        }
    }
}

/// Case-insensitive substring match on `column`. Wildcards in `needle` match
/// literally. SQLite's `lower()` only folds ASCII letters.
pub(crate) fn contains_folded(column: impl IntoColumnRef, needle: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column)))
        .like(LikeExpr::new(like_pattern(needle)).escape(LIKE_ESCAPE))
}

fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
