//! Fixtures shared by the unit tests.
//!
//! Every call to [`create_test_db`] hands back a fresh, fully migrated
//! in-memory SQLite database. SeaORM pins in-memory SQLite to a single
//! connection, so a test must run all queries inside a transaction through
//! that transaction handle.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;

use crate::{
    auth::Principal,
    config::Settings,
    entity::prelude::*,
    events::Dispatcher,
    ids::{CategoryId, PostId, UserId},
    media::LocalMediaStore,
    models::migrator::Migrator,
    service::Services,
};

pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

async fn insert_user(db: &DatabaseConnection, name: &str, role: Role) -> UserModel {
    UserActiveModel {
        id: Set(UserId::new()),
        name: Set(name.to_string()),
        email: Set(format!("{}@campus.test", name.to_lowercase())),
        password_hash: Set(String::new()),
        role: Set(role),
        is_approved: Set(true),
        nim: Set(None),
        prodi: Set(None),
        angkatan: Set(None),
        avatar_path: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("Failed to insert user")
}

/// An approved member account.
pub async fn create_user(db: &DatabaseConnection, name: &str) -> UserModel {
    insert_user(db, name, Role::User).await
}

pub async fn create_admin(db: &DatabaseConnection, name: &str) -> UserModel {
    insert_user(db, name, Role::Admin).await
}

pub async fn create_category(db: &DatabaseConnection, name: &str) -> CategoryModel {
    CategoryActiveModel {
        id: Set(CategoryId::new()),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await
    .expect("Failed to insert category")
}

/// Inserts a post directly, in a category of its own.
pub async fn create_post(db: &DatabaseConnection, owner: UserId, title: &str) -> PostModel {
    let post_id = PostId::new();
    let category = create_category(db, &format!("category-{post_id}")).await;
    let now = Utc::now();

    PostActiveModel {
        id: Set(post_id),
        user_id: Set(owner),
        category_id: Set(category.id),
        title: Set(title.to_string()),
        content: Set(format!("{title} body")),
        media_path: Set(None),
        media_type: Set(None),
        views: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("Failed to insert post")
}

pub fn principal(user: &UserModel) -> Principal {
    Principal::from(user)
}

/// Services backed by `db`, with media written to a fresh temp directory.
pub fn services(db: &DatabaseConnection) -> Services {
    let media_dir = std::env::temp_dir().join(format!("campus_test_media_{}", UserId::new()));
    let settings = Settings {
        media_dir: media_dir.clone(),
        ..Settings::default()
    };

    Services::new(
        db.clone(),
        &settings,
        Dispatcher::with_notifications(),
        Arc::new(LocalMediaStore::new(media_dir)),
    )
}
