use sea_orm::DatabaseConnection;
use zel_core::prelude::*;

use crate::{entity::prelude::*, error::ServiceResult};

/// Lookup tables shown in forms: categories, tags and study programs.
#[derive(Clone)]
pub struct CatalogService {
    db: DatabaseConnection,
}

impl CatalogService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn _list_categories(&self) -> ServiceResult<Vec<CategoryModel>> {
        Ok(Category::find()
            .order_by_asc(CategoryColumn::Name)
            .all(&self.db)
            .await?)
    }

    pub async fn _list_tags(&self) -> ServiceResult<Vec<TagModel>> {
        Ok(Tag::find().order_by_asc(TagColumn::Name).all(&self.db).await?)
    }

    pub async fn _list_prodis(&self) -> ServiceResult<Vec<ProdiModel>> {
        Ok(Prodi::find()
            .order_by_asc(ProdiColumn::Name)
            .all(&self.db)
            .await?)
    }
}

#[zel_service(name = "catalog")]
trait Catalog {
    #[method(name = "list_categories")]
    async fn list_categories(&self) -> Result<Vec<CategoryModel>, ResourceError>;

    #[method(name = "list_tags")]
    async fn list_tags(&self) -> Result<Vec<TagModel>, ResourceError>;

    #[method(name = "list_prodis")]
    async fn list_prodis(&self) -> Result<Vec<ProdiModel>, ResourceError>;
}

#[async_trait]
impl CatalogServer for CatalogService {
    async fn list_categories(&self, _ctx: RequestContext) -> Result<Vec<CategoryModel>, ResourceError> {
        Ok(self._list_categories().await?)
    }

    async fn list_tags(&self, _ctx: RequestContext) -> Result<Vec<TagModel>, ResourceError> {
        Ok(self._list_tags().await?)
    }

    async fn list_prodis(&self, _ctx: RequestContext) -> Result<Vec<ProdiModel>, ResourceError> {
        Ok(self._list_prodis().await?)
    }
}
