use sea_orm_migration::{prelude::*, schema::*};

use super::m20251117_000001_create_user_table::User;
use super::m20251117_000003_create_post_tables::Post;
use super::m20251117_000004_create_comment_table::Comment;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The primary keys are (user, target): a second like is a constraint
        // violation, not something callers have to check for first.
        manager
            .create_table(
                Table::create()
                    .table(PostLike::Table)
                    .col(uuid(PostLike::UserId))
                    .col(uuid(PostLike::PostId))
                    .col(timestamp_with_time_zone(PostLike::CreatedAt))
                    .primary_key(
                        Index::create()
                            .col(PostLike::UserId)
                            .col(PostLike::PostId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-post_like-user_id")
                            .from(PostLike::Table, PostLike::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-post_like-post_id")
                            .from(PostLike::Table, PostLike::PostId)
                            .to(Post::Table, Post::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_post_like_post_id")
                    .table(PostLike::Table)
                    .col(PostLike::PostId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CommentLike::Table)
                    .col(uuid(CommentLike::UserId))
                    .col(uuid(CommentLike::CommentId))
                    .col(timestamp_with_time_zone(CommentLike::CreatedAt))
                    .primary_key(
                        Index::create()
                            .col(CommentLike::UserId)
                            .col(CommentLike::CommentId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-comment_like-user_id")
                            .from(CommentLike::Table, CommentLike::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-comment_like-comment_id")
                            .from(CommentLike::Table, CommentLike::CommentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comment_like_comment_id")
                    .table(CommentLike::Table)
                    .col(CommentLike::CommentId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CommentLike::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PostLike::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum PostLike {
    Table,
    UserId,
    PostId,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum CommentLike {
    Table,
    UserId,
    CommentId,
    CreatedAt,
}
