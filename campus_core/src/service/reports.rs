use chrono::Utc;
use sea_orm::{prelude::Uuid, Condition, DatabaseConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use zel_core::prelude::*;

use crate::{
    auth::{self, Principal},
    config::Settings,
    entity::prelude::*,
    error::{ServiceError, ServiceResult},
    ids::ReportId,
    pagination::{fetch_page, Page},
};

const REASON_MAX: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportView {
    pub report: ReportModel,
    pub reporter_name: String,
}

#[derive(Clone)]
pub struct ReportsService {
    db: DatabaseConnection,
    settings: Settings,
}

impl ReportsService {
    pub fn new(db: DatabaseConnection, settings: Settings) -> Self {
        Self { db, settings }
    }

    async fn target_exists<C: ConnectionTrait>(conn: &C, target: Source) -> ServiceResult<bool> {
        let found = match target {
            Source::Post(id) => Post::find_by_id(id).one(conn).await?.is_some(),
            Source::Comment(id) => Comment::find_by_id(id).one(conn).await?.is_some(),
        };
        Ok(found)
    }

    /// File a report against a post or a comment.
    pub async fn _report(&self, principal: &Principal, target: Source, reason: String) -> ServiceResult<ReportModel> {
        let reason = reason.trim().to_string();
        if reason.is_empty() || reason.chars().count() > REASON_MAX {
            return Err(ServiceError::validation("reason must be 1 to 1000 characters"));
        }
        let txn = self.db.begin().await?;

        if !Self::target_exists(&txn, target).await? {
            return Err(ServiceError::NotFound(match target.kind() {
                SourceKind::Post => "post",
                SourceKind::Comment => "comment",
            }));
        }

        let (target_kind, target_id) = target.into_parts();
        let report = ReportActiveModel {
            id: Set(ReportId::new()),
            user_id: Set(principal.id),
            reason: Set(reason),
            status: Set(ReportStatus::Pending),
            target_kind: Set(target_kind),
            target_id: Set(target_id),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(report = %report.id, ?target, "report filed");
        Ok(report)
    }

    pub async fn _list_pending(
        &self,
        admin: &Principal,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> ServiceResult<Page<ReportView>> {
        admin.require_admin()?;

        let pagination = &self.settings.pagination;
        let per_page = pagination.per_page(per_page, pagination.reports);

        let select = Report::find()
            .filter(ReportColumn::Status.eq(ReportStatus::Pending))
            .order_by_desc(ReportColumn::CreatedAt)
            .order_by_desc(ReportColumn::Id)
            .find_also_related(User);

        let page = fetch_page(select, &self.db, page.unwrap_or(1), per_page).await?;

        Ok(page.map(|(report, reporter)| ReportView {
            report,
            reporter_name: reporter.map(|user| user.name).unwrap_or_default(),
        }))
    }

    /// Dismissing a report deletes it.
    pub async fn _dismiss(&self, admin: &Principal, report_id: ReportId) -> ServiceResult<()> {
        admin.require_admin()?;

        let result = Report::delete_by_id(report_id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("report"));
        }

        info!(report = %report_id, admin = %admin.id, "report dismissed");
        Ok(())
    }
}

/// Delete every report filed against `targets`. Runs on the caller's
/// connection so it shares the transaction that removes the targets.
pub(crate) async fn delete_reports_for<C: ConnectionTrait>(conn: &C, targets: &[Source]) -> Result<u64, DbErr> {
    if targets.is_empty() {
        return Ok(0);
    }

    let mut condition = Condition::any();
    for kind in [SourceKind::Post, SourceKind::Comment] {
        let ids: Vec<Uuid> = targets
            .iter()
            .filter(|target| target.kind() == kind)
            .map(Source::uuid)
            .collect();
        if !ids.is_empty() {
            condition = condition.add(
                Condition::all()
                    .add(ReportColumn::TargetKind.eq(kind))
                    .add(ReportColumn::TargetId.is_in(ids)),
            );
        }
    }

    let result = Report::delete_many().filter(condition).exec(conn).await?;
    Ok(result.rows_affected)
}

#[zel_service(name = "reports")]
trait Reports {
    #[doc = "Report a post or comment for moderation"]
    #[method(name = "report")]
    async fn report(&self, target: Source, reason: String) -> Result<ReportModel, ResourceError>;

    #[doc = "Pending reports, newest first (admin only)"]
    #[method(name = "list_pending")]
    async fn list_pending(
        &self,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<Page<ReportView>, ResourceError>;

    #[doc = "Dismiss a report (admin only)"]
    #[method(name = "dismiss")]
    async fn dismiss(&self, report_id: ReportId) -> Result<(), ResourceError>;
}

#[async_trait]
impl ReportsServer for ReportsService {
    async fn report(&self, ctx: RequestContext, target: Source, reason: String) -> Result<ReportModel, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._report(&principal, target, reason).await?)
    }

    async fn list_pending(
        &self,
        ctx: RequestContext,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<Page<ReportView>, ResourceError> {
        let admin = auth::principal(&self.db, &ctx).await?;
        Ok(self._list_pending(&admin, page, per_page).await?)
    }

    async fn dismiss(&self, ctx: RequestContext, report_id: ReportId) -> Result<(), ResourceError> {
        let admin = auth::principal(&self.db, &ctx).await?;
        Ok(self._dismiss(&admin, report_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ids::PostId, test_utils};

    #[tokio::test]
    async fn test_report_lifecycle() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let reporter = test_utils::principal(&test_utils::create_user(&db, "Reporter").await);
        let admin = test_utils::principal(&test_utils::create_admin(&db, "Admin").await);
        let post = test_utils::create_post(&db, owner.id, "Spam").await;
        let comment = services
            .comments
            ._create_comment(&reporter, post.id, "buy now".into(), None)
            .await
            .unwrap();

        let on_post = services
            .reports
            ._report(&reporter, Source::Post(post.id), "spam".into())
            .await
            .unwrap();
        assert_eq!(on_post.status, ReportStatus::Pending);
        assert_eq!(on_post.target(), Source::Post(post.id));

        services
            .reports
            ._report(&reporter, Source::Comment(comment.id), "also spam".into())
            .await
            .unwrap();

        let pending = services.reports._list_pending(&admin, None, None).await.unwrap();
        assert_eq!(pending.total, 2);
        assert_eq!(pending.items[0].report.target(), Source::Comment(comment.id));
        assert_eq!(pending.items[0].reporter_name, "Reporter");

        services.reports._dismiss(&admin, on_post.id).await.unwrap();
        assert!(matches!(
            services.reports._dismiss(&admin, on_post.id).await,
            Err(ServiceError::NotFound("report"))
        ));
        assert_eq!(
            services.reports._list_pending(&admin, None, None).await.unwrap().total,
            1
        );
    }

    #[tokio::test]
    async fn test_report_validation_and_admin_gate() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let member = test_utils::principal(&owner);
        let post = test_utils::create_post(&db, owner.id, "Post").await;

        assert!(matches!(
            services.reports._report(&member, Source::Post(post.id), "  ".into()).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            services
                .reports
                ._report(&member, Source::Post(PostId::new()), "gone".into())
                .await,
            Err(ServiceError::NotFound("post"))
        ));
        assert!(matches!(
            services.reports._list_pending(&member, None, None).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            services.reports._dismiss(&member, ReportId::new()).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_deleting_targets_removes_their_reports() {
        let db = test_utils::create_test_db().await;
        let services = test_utils::services(&db);
        let owner = test_utils::create_user(&db, "Owner").await;
        let author = test_utils::principal(&owner);
        let reporter = test_utils::principal(&test_utils::create_user(&db, "Reporter").await);
        let admin = test_utils::principal(&test_utils::create_admin(&db, "Admin").await);
        let post = test_utils::create_post(&db, owner.id, "Heated").await;
        let other = test_utils::create_post(&db, owner.id, "Calm").await;

        let top = services
            .comments
            ._create_comment(&author, post.id, "first".into(), None)
            .await
            .unwrap();
        let reply = services
            .comments
            ._create_comment(&reporter, post.id, "rude".into(), Some(top.id))
            .await
            .unwrap();
        let kept = services
            .comments
            ._create_comment(&reporter, post.id, "fine".into(), None)
            .await
            .unwrap();

        for target in [
            Source::Comment(reply.id),
            Source::Comment(kept.id),
            Source::Post(post.id),
            Source::Post(other.id),
        ] {
            services
                .reports
                ._report(&reporter, target, "please check".into())
                .await
                .unwrap();
        }

        let pending_targets = |page: Page<ReportView>| -> Vec<Source> {
            page.items.iter().map(|view| view.report.target()).collect()
        };

        services.comments._delete_comment(&author, top.id).await.unwrap();
        let pending = services.reports._list_pending(&admin, None, None).await.unwrap();
        assert_eq!(pending.total, 3);
        assert!(!pending_targets(pending).contains(&Source::Comment(reply.id)));

        services.posts._delete_post(&author, post.id).await.unwrap();
        let pending = services.reports._list_pending(&admin, None, None).await.unwrap();
        assert_eq!(pending_targets(pending), vec![Source::Post(other.id)]);
    }
}
