use sea_orm::{ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, Set};
use tracing::info;

use crate::entity::prelude::*;
use crate::ids::{CategoryId, ProdiId};

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Coursework",
    "Campus Events",
    "Internships",
    "Thesis",
    "General",
];

pub const DEFAULT_PRODIS: &[&str] = &[
    "D3 Teknologi Informasi",
    "D3 Teknologi Komputer",
    "D4 Teknologi Rekayasa Perangkat Lunak",
    "S1 Informatika",
    "S1 Sistem Informasi",
    "S1 Teknik Elektro",
    "S1 Manajemen Rekayasa",
    "S1 Teknik Metalurgi",
    "S1 Bioproses",
    "S1 Bioteknologi",
];

/// Fill the category and study-program tables on first start.
///
/// Tables that already hold rows are left alone, so edits made by an
/// operator survive restarts.
pub async fn seed_catalog<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    if Category::find().count(db).await? == 0 {
        let rows = DEFAULT_CATEGORIES.iter().map(|name| CategoryActiveModel {
            id: Set(CategoryId::new()),
            name: Set(name.to_string()),
        });
        Category::insert_many(rows).exec(db).await?;
        info!(count = DEFAULT_CATEGORIES.len(), "seeded categories");
    }

    if Prodi::find().count(db).await? == 0 {
        let rows = DEFAULT_PRODIS.iter().map(|name| ProdiActiveModel {
            id: Set(ProdiId::new()),
            name: Set(name.to_string()),
        });
        Prodi::insert_many(rows).exec(db).await?;
        info!(count = DEFAULT_PRODIS.len(), "seeded study programs");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::migrator::Migrator;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        seed_catalog(&db).await.unwrap();
        seed_catalog(&db).await.unwrap();

        let categories = Category::find().count(&db).await.unwrap();
        let prodis = Prodi::find().count(&db).await.unwrap();
        assert_eq!(categories as usize, DEFAULT_CATEGORIES.len());
        assert_eq!(prodis as usize, DEFAULT_PRODIS.len());
    }
}
