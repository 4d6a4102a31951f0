use crate::ids::ProdiId;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A study program a student can register under.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "prodi")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: ProdiId,
    #[sea_orm(unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
