#[cfg(test)]
mod entity_tests {
    use chrono::Utc;
    use sea_orm::DbErr;

    use crate::entity::prelude::*;
    use crate::error::ServiceError;
    use crate::ids::*;
    use crate::models::migrator::Migrator;
    use sea_orm_migration::MigratorTrait;

    /// Test helper to create and migrate an in-memory database
    async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        // Run all migrations
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    fn user(name: &str, email: &str) -> UserActiveModel {
        UserActiveModel {
            id: Set(UserId::new()),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            password_hash: Set("hash".to_string()),
            role: Set(Role::User),
            is_approved: Set(false),
            nim: Set(None),
            prodi: Set(None),
            angkatan: Set(None),
            avatar_path: Set(None),
            created_at: Set(Utc::now()),
        }
    }

    async fn post(db: &DatabaseConnection, owner: UserId) -> PostModel {
        let category = CategoryActiveModel {
            id: Set(CategoryId::new()),
            name: Set(format!("cat-{}", CategoryId::new())),
        }
        .insert(db)
        .await
        .expect("Failed to insert category");

        let now = Utc::now();
        PostActiveModel {
            id: Set(PostId::new()),
            user_id: Set(owner),
            category_id: Set(category.id),
            title: Set("Title".to_string()),
            content: Set("Body".to_string()),
            media_path: Set(None),
            media_type: Set(Some(MediaKind::Video)),
            views: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("Failed to insert post")
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let db = setup_test_db().await;

        let inserted = user("Sari", "sari@campus.test")
            .insert(&db)
            .await
            .expect("Failed to insert user");

        let found = User::find_by_id(inserted.id)
            .one(&db)
            .await
            .expect("Failed to query user")
            .expect("user missing");

        assert_eq!(found.name, "Sari");
        assert_eq!(found.role, Role::User);
        assert!(!found.is_approved);
        assert!(!found.is_admin());
    }

    #[tokio::test]
    async fn test_email_is_unique() {
        let db = setup_test_db().await;

        user("One", "same@campus.test").insert(&db).await.unwrap();
        let err: DbErr = user("Two", "same@campus.test")
            .insert(&db)
            .await
            .unwrap_err();

        assert!(matches!(
            ServiceError::conflict_on_unique(err, "email"),
            ServiceError::Conflict("email")
        ));
    }

    #[tokio::test]
    async fn test_password_hash_is_not_serialized() {
        let db = setup_test_db().await;
        let saved = user("Hidden", "hidden@campus.test").insert(&db).await.unwrap();

        let json = serde_json::to_value(&saved).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }

    #[tokio::test]
    async fn test_post_like_is_unique_per_user() {
        let db = setup_test_db().await;
        let owner = user("Owner", "owner@campus.test").insert(&db).await.unwrap();
        let post = post(&db, owner.id).await;

        let like = || PostLikeActiveModel {
            user_id: Set(owner.id),
            post_id: Set(post.id),
            created_at: Set(Utc::now()),
        };

        like().insert(&db).await.unwrap();
        let err = like().insert(&db).await.unwrap_err();

        assert!(matches!(
            ServiceError::conflict_on_unique(err, "like"),
            ServiceError::Conflict("like")
        ));
        assert_eq!(PostLike::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_post_tags_via_join_table() {
        let db = setup_test_db().await;
        let owner = user("Owner", "owner@campus.test").insert(&db).await.unwrap();
        let post = post(&db, owner.id).await;

        for name in ["b-tag", "a-tag"] {
            let tag = TagActiveModel {
                id: Set(TagId::new()),
                name: Set(name.to_string()),
            }
            .insert(&db)
            .await
            .unwrap();
            PostTagActiveModel {
                post_id: Set(post.id),
                tag_id: Set(tag.id),
            }
            .insert(&db)
            .await
            .unwrap();
        }

        let tags = post
            .find_related(Tag)
            .order_by_asc(TagColumn::Name)
            .all(&db)
            .await
            .unwrap();
        let names: Vec<_> = tags.into_iter().map(|tag| tag.name).collect();
        assert_eq!(names, vec!["a-tag", "b-tag"]);
        assert_eq!(post.media_type, Some(MediaKind::Video));
    }

    #[tokio::test]
    async fn test_notification_source_round_trip() {
        let db = setup_test_db().await;
        let owner = user("Owner", "owner@campus.test").insert(&db).await.unwrap();
        let sender = user("Sender", "sender@campus.test").insert(&db).await.unwrap();
        let comment_id = CommentId::new();
        let (source_kind, source_id) = Source::Comment(comment_id).into_parts();

        let saved = NotificationActiveModel {
            id: Set(NotificationId::new()),
            user_id: Set(owner.id),
            sender_id: Set(sender.id),
            kind: Set(NotificationKind::ReplyComment),
            source_kind: Set(source_kind),
            source_id: Set(source_id),
            message: Set("hello".to_string()),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();

        let found = Notification::find()
            .filter(NotificationColumn::Kind.eq(NotificationKind::ReplyComment))
            .filter(NotificationColumn::SourceKind.eq(SourceKind::Comment))
            .one(&db)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.id, saved.id);
        assert_eq!(found.source(), Source::Comment(comment_id));
    }

    #[tokio::test]
    async fn test_report_target_round_trip() {
        let db = setup_test_db().await;
        let reporter = user("Reporter", "r@campus.test").insert(&db).await.unwrap();
        let post_id = PostId::new();

        let report = ReportActiveModel {
            id: Set(ReportId::new()),
            user_id: Set(reporter.id),
            reason: Set("off topic".to_string()),
            status: Set(ReportStatus::Pending),
            target_kind: Set(SourceKind::Post),
            target_id: Set(post_id.into_uuid()),
            created_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();

        assert_eq!(report.target(), Source::Post(post_id));
        assert_eq!(report.status, ReportStatus::Pending);
    }

    #[tokio::test]
    async fn test_session_binds_node_to_user() {
        let db = setup_test_db().await;
        let owner = user("Owner", "owner@campus.test").insert(&db).await.unwrap();
        let node_id = vec![9u8; 32];

        SessionActiveModel {
            node_id: Set(node_id.clone()),
            user_id: Set(owner.id),
            created_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();

        let session = Session::find_by_id(node_id).one(&db).await.unwrap().unwrap();
        assert_eq!(session.user_id, owner.id);
    }
}
