use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ids::{CommentId, PostId};

/// Discriminator column stored next to a polymorphic id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[sea_orm(string_value = "post")]
    Post,
    #[sea_orm(string_value = "comment")]
    Comment,
}

/// A reference to either a post or a comment.
///
/// Notifications and reports both point at one of these. In storage it is
/// split into a `*_kind` column and a `*_id` column; use [`Source::from_parts`]
/// and [`Source::into_parts`] to cross that boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Source {
    Post(PostId),
    Comment(CommentId),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Post(_) => SourceKind::Post,
            Source::Comment(_) => SourceKind::Comment,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Source::Post(id) => id.into_uuid(),
            Source::Comment(id) => id.into_uuid(),
        }
    }

    pub fn from_parts(kind: SourceKind, id: Uuid) -> Self {
        match kind {
            SourceKind::Post => Source::Post(PostId::from_uuid(id)),
            SourceKind::Comment => Source::Comment(CommentId::from_uuid(id)),
        }
    }

    pub fn into_parts(self) -> (SourceKind, Uuid) {
        (self.kind(), self.uuid())
    }
}

impl From<PostId> for Source {
    fn from(id: PostId) -> Self {
        Source::Post(id)
    }
}

impl From<CommentId> for Source {
    fn from(id: CommentId) -> Self {
        Source::Comment(id)
    }
}
