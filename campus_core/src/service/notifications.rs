use sea_orm::{sea_query::Expr, DatabaseConnection};
use zel_core::prelude::*;

use crate::{
    auth::{self, Principal},
    config::Settings,
    entity::prelude::*,
    error::{ServiceError, ServiceResult},
    ids::NotificationId,
    pagination::{fetch_page, Page},
};

/// Read side of the notification engine. Rows are only ever written by the
/// event handlers; here they can be listed and marked read.
#[derive(Clone)]
pub struct NotificationsService {
    db: DatabaseConnection,
    settings: Settings,
}

impl NotificationsService {
    pub fn new(db: DatabaseConnection, settings: Settings) -> Self {
        Self { db, settings }
    }

    pub async fn _list_notifications(
        &self,
        principal: &Principal,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> ServiceResult<Page<NotificationModel>> {
        let pagination = &self.settings.pagination;
        let per_page = pagination.per_page(per_page, pagination.notifications);

        let select = Notification::find()
            .filter(NotificationColumn::UserId.eq(principal.id))
            .order_by_desc(NotificationColumn::CreatedAt)
            .order_by_desc(NotificationColumn::Id);

        Ok(fetch_page(select, &self.db, page.unwrap_or(1), per_page).await?)
    }

    pub async fn _unread_count(&self, principal: &Principal) -> ServiceResult<u64> {
        Ok(Notification::find()
            .filter(NotificationColumn::UserId.eq(principal.id))
            .filter(NotificationColumn::IsRead.eq(false))
            .count(&self.db)
            .await?)
    }

    /// Someone else's notification looks the same as a missing one.
    pub async fn _mark_read(
        &self,
        principal: &Principal,
        notification_id: NotificationId,
    ) -> ServiceResult<NotificationModel> {
        let notification = Notification::find_by_id(notification_id)
            .filter(NotificationColumn::UserId.eq(principal.id))
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound("notification"))?;

        if notification.is_read {
            return Ok(notification);
        }

        let mut active: NotificationActiveModel = notification.into();
        active.is_read = Set(true);
        Ok(active.update(&self.db).await?)
    }

    /// Returns how many notifications changed state.
    pub async fn _mark_all_read(&self, principal: &Principal) -> ServiceResult<u64> {
        let result = Notification::update_many()
            .col_expr(NotificationColumn::IsRead, Expr::value(true))
            .filter(NotificationColumn::UserId.eq(principal.id))
            .filter(NotificationColumn::IsRead.eq(false))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

#[zel_service(name = "notifications")]
trait Notifications {
    #[doc = "The caller's notifications, newest first"]
    #[method(name = "list_notifications")]
    async fn list_notifications(
        &self,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<Page<NotificationModel>, ResourceError>;

    #[method(name = "unread_count")]
    async fn unread_count(&self) -> Result<u64, ResourceError>;

    #[method(name = "mark_read")]
    async fn mark_read(&self, notification_id: NotificationId) -> Result<NotificationModel, ResourceError>;

    #[method(name = "mark_all_read")]
    async fn mark_all_read(&self) -> Result<u64, ResourceError>;
}

#[async_trait]
impl NotificationsServer for NotificationsService {
    async fn list_notifications(
        &self,
        ctx: RequestContext,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<Page<NotificationModel>, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._list_notifications(&principal, page, per_page).await?)
    }

    async fn unread_count(&self, ctx: RequestContext) -> Result<u64, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._unread_count(&principal).await?)
    }

    async fn mark_read(
        &self,
        ctx: RequestContext,
        notification_id: NotificationId,
    ) -> Result<NotificationModel, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._mark_read(&principal, notification_id).await?)
    }

    async fn mark_all_read(&self, ctx: RequestContext) -> Result<u64, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._mark_all_read(&principal).await?)
    }
}
