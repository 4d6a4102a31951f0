use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .col(pk_uuid(User::Id))
                    .col(string(User::Name))
                    .col(string_uniq(User::Email))
                    .col(string(User::PasswordHash))
                    .col(string_len(User::Role, 16))
                    .col(boolean(User::IsApproved).default(false))
                    .col(string_len_null(User::Nim, 20).unique_key())
                    .col(string_null(User::Prodi))
                    .col(integer_null(User::Angkatan))
                    .col(string_null(User::AvatarPath))
                    .col(timestamp_with_time_zone(User::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Pending-approval listing filters on this
        manager
            .create_index(
                Index::create()
                    .name("idx_user_is_approved")
                    .table(User::Table)
                    .col(User::IsApproved)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum User {
    Table,
    Id,
    Name,
    Email,
    PasswordHash,
    Role,
    IsApproved,
    Nim,
    Prodi,
    Angkatan,
    AvatarPath,
    CreatedAt,
}
