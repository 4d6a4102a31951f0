use crate::ids::{NotificationId, UserId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::source::{Source, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "comment_post")]
    CommentPost,
    #[sea_orm(string_value = "reply_comment")]
    ReplyComment,
    #[sea_orm(string_value = "like_post")]
    LikePost,
    #[sea_orm(string_value = "like_comment")]
    LikeComment,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// The user whose action produced this notification.
    pub sender_id: UserId,
    pub kind: NotificationKind,
    pub source_kind: SourceKind,
    pub source_id: Uuid,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn source(&self) -> Source {
        Source::from_parts(self.source_kind, self.source_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Recipient,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SenderId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Sender,
}

impl ActiveModelBehavior for ActiveModel {}
