use sea_orm_migration::prelude::*;

mod m20251117_000001_create_user_table;
mod m20251117_000002_create_catalog_tables;
mod m20251117_000003_create_post_tables;
mod m20251117_000004_create_comment_table;
mod m20251117_000005_create_like_tables;
mod m20251119_000006_create_notification_table;
mod m20251122_000007_create_report_table;
mod m20251122_000008_create_session_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251117_000001_create_user_table::Migration),
            Box::new(m20251117_000002_create_catalog_tables::Migration),
            Box::new(m20251117_000003_create_post_tables::Migration),
            Box::new(m20251117_000004_create_comment_table::Migration),
            Box::new(m20251117_000005_create_like_tables::Migration),
            Box::new(m20251119_000006_create_notification_table::Migration),
            Box::new(m20251122_000007_create_report_table::Migration),
            Box::new(m20251122_000008_create_session_table::Migration),
        ]
    }
}

#[cfg(test)]
use sea_orm::{Database, DbErr};

#[tokio::test]
async fn test_migrations_okay() -> Result<(), DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    let schema_manager = SchemaManager::new(&db);

    Migrator::refresh(&db).await?;

    for table in [
        "user",
        "category",
        "tag",
        "prodi",
        "post",
        "post_tag",
        "comment",
        "post_like",
        "comment_like",
        "notification",
        "report",
        "session",
    ] {
        assert!(schema_manager.has_table(table).await?, "missing table {table}");
    }

    Ok(())
}
