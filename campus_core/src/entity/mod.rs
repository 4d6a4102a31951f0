// SeaORM entities
// One module per table. Polymorphic references (notification sources,
// report targets) live in `source`.

pub mod category;
pub mod comment;
pub mod comment_like;
pub mod notification;
pub mod post;
pub mod post_like;
pub mod post_tag;
pub mod prodi;
pub mod report;
pub mod session;
pub mod source;
pub mod tag;
pub mod user;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use super::category::{
        ActiveModel as CategoryActiveModel, Column as CategoryColumn, Entity as Category,
        Model as CategoryModel,
    };
    pub use super::comment::{
        ActiveModel as CommentActiveModel, Column as CommentColumn, Entity as Comment,
        Model as CommentModel,
    };
    pub use super::comment_like::{
        ActiveModel as CommentLikeActiveModel, Column as CommentLikeColumn,
        Entity as CommentLike, Model as CommentLikeModel,
    };
    pub use super::notification::{
        ActiveModel as NotificationActiveModel, Column as NotificationColumn,
        Entity as Notification, Model as NotificationModel, NotificationKind,
    };
    pub use super::post::{
        ActiveModel as PostActiveModel, Column as PostColumn, Entity as Post, MediaKind,
        Model as PostModel,
    };
    pub use super::post_like::{
        ActiveModel as PostLikeActiveModel, Column as PostLikeColumn, Entity as PostLike,
        Model as PostLikeModel,
    };
    pub use super::post_tag::{
        ActiveModel as PostTagActiveModel, Column as PostTagColumn, Entity as PostTag,
        Model as PostTagModel,
    };
    pub use super::prodi::{
        ActiveModel as ProdiActiveModel, Column as ProdiColumn, Entity as Prodi,
        Model as ProdiModel,
    };
    pub use super::report::{
        ActiveModel as ReportActiveModel, Column as ReportColumn, Entity as Report,
        Model as ReportModel, ReportStatus,
    };
    pub use super::session::{
        ActiveModel as SessionActiveModel, Column as SessionColumn, Entity as Session,
        Model as SessionModel,
    };
    pub use super::source::{Source, SourceKind};
    pub use super::tag::{
        ActiveModel as TagActiveModel, Column as TagColumn, Entity as Tag, Model as TagModel,
    };
    pub use super::user::{
        ActiveModel as UserActiveModel, Column as UserColumn, Entity as User,
        Model as UserModel, Role,
    };

    // Re-export commonly used SeaORM types and traits
    pub use sea_orm::{
        ActiveModelTrait,
        ActiveValue,

        ColumnTrait,
        ConnectionTrait,

        // Database and connection types
        Database,
        DatabaseConnection,
        DatabaseTransaction,
        DbConn,
        // Common result types
        DbErr,

        // Core traits
        EntityTrait,
        ModelTrait,
        NotSet,
        // Pagination
        PaginatorTrait,
        QueryFilter,
        QueryOrder,
        QuerySelect,
        Related,
        RelationTrait,
        // Active model helpers
        Set,
        TransactionTrait,
    };
}
