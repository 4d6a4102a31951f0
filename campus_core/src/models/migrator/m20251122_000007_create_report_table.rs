use sea_orm_migration::{prelude::*, schema::*};

use super::m20251117_000001_create_user_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Report::Table)
                    .col(pk_uuid(Report::Id))
                    .col(uuid(Report::UserId))
                    .col(string(Report::Reason))
                    .col(string_len(Report::Status, 16).default("pending"))
                    .col(string_len(Report::TargetKind, 16))
                    .col(uuid(Report::TargetId))
                    .col(timestamp_with_time_zone(Report::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-report-user_id")
                            .from(Report::Table, Report::UserId)
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
                    .name("idx_report_status")
                    .table(Report::Table)
                    .col(Report::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Report::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Report {
    Table,
    Id,
    UserId,
    Reason,
    Status,
    TargetKind,
    TargetId,
    CreatedAt,
}
