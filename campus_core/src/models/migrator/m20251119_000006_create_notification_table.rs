use sea_orm_migration::{prelude::*, schema::*};

use super::m20251117_000001_create_user_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // source_id has no foreign key: it points at a post or a comment
        // depending on source_kind.
        manager
            .create_table(
                Table::create()
                    .table(Notification::Table)
                    .col(pk_uuid(Notification::Id))
                    .col(uuid(Notification::UserId))
                    .col(uuid(Notification::SenderId))
                    .col(string_len(Notification::Kind, 32))
                    .col(string_len(Notification::SourceKind, 16))
                    .col(uuid(Notification::SourceId))
                    .col(string(Notification::Message))
                    .col(boolean(Notification::IsRead).default(false))
                    .col(timestamp_with_time_zone(Notification::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-notification-user_id")
                            .from(Notification::Table, Notification::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-notification-sender_id")
                            .from(Notification::Table, Notification::SenderId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_user_id")
                    .table(Notification::Table)
                    .col(Notification::UserId)
                    .col(Notification::IsRead)
                    .to_owned(),
            )
            .await?;

        // Retraction deletes by source
        manager
            .create_index(
                Index::create()
                    .name("idx_notification_source")
                    .table(Notification::Table)
                    .col(Notification::SourceKind)
                    .col(Notification::SourceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Notification {
    Table,
    Id,
    UserId,
    SenderId,
    Kind,
    SourceKind,
    SourceId,
    Message,
    IsRead,
    CreatedAt,
}
