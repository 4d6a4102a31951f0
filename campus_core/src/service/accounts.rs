use std::sync::Arc;

use chrono::Utc;
use sea_orm::{Condition, DatabaseConnection, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::info;
use zel_core::prelude::*;

use crate::{
    auth::{self, hash_password, verify_password, Principal},
    config::AdminBootstrap,
    entity::prelude::*,
    error::{ServiceError, ServiceResult},
    ids::UserId,
    media::{self, MediaPurpose, MediaStore, Upload},
};

const NAME_MAX: usize = 255;
const NIM_MAX: usize = 20;
const PRODI_MAX: usize = 100;
const PASSWORD_MIN: usize = 8;

const EMAIL_TAKEN: &str = "email is already registered";
const NIM_TAKEN: &str = "nim is already registered";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub nim: String,
    pub prodi: String,
    pub angkatan: i32,
}

impl NewUser {
    fn validate(&self) -> ServiceResult<()> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > NAME_MAX {
            return Err(ServiceError::validation("name must be 1 to 255 characters"));
        }
        if !looks_like_email(self.email.trim()) {
            return Err(ServiceError::validation("email is not valid"));
        }
        if self.password.chars().count() < PASSWORD_MIN {
            return Err(ServiceError::validation("password must be at least 8 characters"));
        }
        if self.password != self.password_confirmation {
            return Err(ServiceError::validation("password confirmation does not match"));
        }
        let nim = self.nim.trim();
        if nim.is_empty() || nim.chars().count() > NIM_MAX {
            return Err(ServiceError::validation("nim must be 1 to 20 characters"));
        }
        let prodi = self.prodi.trim();
        if prodi.is_empty() || prodi.chars().count() > PRODI_MAX {
            return Err(ServiceError::validation("prodi must be 1 to 100 characters"));
        }
        if !(1000..=9999).contains(&self.angkatan) {
            return Err(ServiceError::validation("angkatan must be a 4 digit year"));
        }
        Ok(())
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Clone)]
pub struct AccountsService {
    db: DatabaseConnection,
    media: Arc<dyn MediaStore>,
}

impl AccountsService {
    pub fn new(db: DatabaseConnection, media: Arc<dyn MediaStore>) -> Self {
        Self { db, media }
    }

    /// Create an account that cannot log in until an admin approves it.
    pub async fn _register(&self, new_user: NewUser) -> ServiceResult<UserModel> {
        new_user.validate()?;

        let email = new_user.email.trim().to_lowercase();
        let nim = new_user.nim.trim().to_string();

        if User::find()
            .filter(UserColumn::Email.eq(email.as_str()))
            .one(&self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::validation(EMAIL_TAKEN));
        }
        if User::find()
            .filter(UserColumn::Nim.eq(nim.as_str()))
            .one(&self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::validation(NIM_TAKEN));
        }

        let user = UserActiveModel {
            id: Set(UserId::new()),
            name: Set(new_user.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(hash_password(&new_user.password)?),
            role: Set(Role::User),
            is_approved: Set(false),
            nim: Set(Some(nim)),
            prodi: Set(Some(new_user.prodi.trim().to_string())),
            angkatan: Set(Some(new_user.angkatan)),
            avatar_path: Set(None),
            created_at: Set(Utc::now()),
        };

        let user = User::insert(user)
            .exec_with_returning(&self.db)
            .await
            .map_err(|err| ServiceError::invalid_on_unique(err, "email or nim is already registered"))?;

        info!(user = %user.id, "registered account awaiting approval");
        Ok(user)
    }

    /// Check credentials and bind `node_id` to the account.
    pub async fn _login(&self, email: &str, password: &str, node_id: &[u8]) -> ServiceResult<UserModel> {
        let user = User::find()
            .filter(UserColumn::Email.eq(email.trim().to_lowercase()))
            .one(&self.db)
            .await?
            .filter(|user| verify_password(password, &user.password_hash))
            .ok_or_else(|| ServiceError::validation("email or password is incorrect"))?;

        if !user.is_approved {
            return Err(ServiceError::Unapproved);
        }

        let txn = self.db.begin().await?;

        // one live session per account, and one account per node
        Session::delete_many()
            .filter(
                Condition::any()
                    .add(SessionColumn::UserId.eq(user.id))
                    .add(SessionColumn::NodeId.eq(node_id.to_vec())),
            )
            .exec(&txn)
            .await?;

        SessionActiveModel {
            node_id: Set(node_id.to_vec()),
            user_id: Set(user.id),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(user = %user.id, "logged in");
        Ok(user)
    }

    pub async fn _logout(&self, node_id: &[u8]) -> ServiceResult<()> {
        Session::delete_by_id(node_id.to_vec())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn _principal_for(&self, node_id: &[u8]) -> ServiceResult<Principal> {
        auth::principal_for_node(&self.db, node_id).await
    }

    pub async fn _list_pending_users(&self, admin: &Principal) -> ServiceResult<Vec<UserModel>> {
        admin.require_admin()?;

        Ok(User::find()
            .filter(UserColumn::IsApproved.eq(false))
            .order_by_asc(UserColumn::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn _approve_user(&self, admin: &Principal, user_id: UserId) -> ServiceResult<UserModel> {
        admin.require_admin()?;

        let user = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;

        if user.is_approved {
            return Ok(user);
        }

        let mut active: UserActiveModel = user.into();
        active.is_approved = Set(true);
        let user = active.update(&self.db).await?;

        info!(user = %user.id, admin = %admin.id, "approved account");
        Ok(user)
    }

    pub async fn _get_user(&self, user_id: UserId) -> ServiceResult<UserModel> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    /// Replace the caller's avatar. The previous file is removed best effort.
    pub async fn _set_avatar(&self, principal: &Principal, upload: Upload) -> ServiceResult<UserModel> {
        let user = self._get_user(principal.id).await?;
        let stored = self.media.store(MediaPurpose::Avatar, &upload).await?;

        let previous = user.avatar_path.clone();
        let mut active: UserActiveModel = user.into();
        active.avatar_path = Set(Some(stored.path.clone()));

        let user = match active.update(&self.db).await {
            Ok(user) => user,
            Err(err) => {
                media::remove_quietly(self.media.as_ref(), &stored.path).await;
                return Err(err.into());
            }
        };

        if let Some(previous) = previous {
            media::remove_quietly(self.media.as_ref(), &previous).await;
        }
        Ok(user)
    }

    /// Make sure an approved admin account exists for `bootstrap.email`.
    pub async fn ensure_admin(&self, bootstrap: &AdminBootstrap) -> ServiceResult<UserModel> {
        let email = bootstrap.email.trim().to_lowercase();

        if let Some(existing) = User::find()
            .filter(UserColumn::Email.eq(email.as_str()))
            .one(&self.db)
            .await?
        {
            if existing.is_admin() && existing.is_approved {
                return Ok(existing);
            }
            let mut active: UserActiveModel = existing.into();
            active.role = Set(Role::Admin);
            active.is_approved = Set(true);
            let admin = active.update(&self.db).await?;
            info!(user = %admin.id, "promoted bootstrap account to admin");
            return Ok(admin);
        }

        let admin = UserActiveModel {
            id: Set(UserId::new()),
            name: Set(bootstrap.name.clone()),
            email: Set(email),
            password_hash: Set(hash_password(&bootstrap.password)?),
            role: Set(Role::Admin),
            is_approved: Set(true),
            nim: Set(None),
            prodi: Set(None),
            angkatan: Set(None),
            avatar_path: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        info!(user = %admin.id, email = %admin.email, "created bootstrap admin account");
        Ok(admin)
    }
}

#[zel_service(name = "accounts")]
trait Accounts {
    #[doc = "Register a new account; it stays pending until an admin approves it"]
    #[method(name = "register")]
    async fn register(&self, new_user: NewUser) -> Result<UserModel, ResourceError>;

    #[doc = "Log in and bind this connection's node to the account"]
    #[method(name = "login")]
    async fn login(&self, email: String, password: String) -> Result<UserModel, ResourceError>;

    #[doc = "Drop the session bound to this connection's node"]
    #[method(name = "logout")]
    async fn logout(&self) -> Result<(), ResourceError>;

    #[doc = "The account bound to this connection"]
    #[method(name = "me")]
    async fn me(&self) -> Result<Principal, ResourceError>;

    #[doc = "Accounts waiting for approval (admin only)"]
    #[method(name = "list_pending_users")]
    async fn list_pending_users(&self) -> Result<Vec<UserModel>, ResourceError>;

    #[doc = "Approve a pending account (admin only)"]
    #[method(name = "approve_user")]
    async fn approve_user(&self, user_id: UserId) -> Result<UserModel, ResourceError>;

    #[doc = "Public profile of a user"]
    #[method(name = "get_user")]
    async fn get_user(&self, user_id: UserId) -> Result<UserModel, ResourceError>;

    #[doc = "Upload a new avatar image for the caller"]
    #[method(name = "set_avatar")]
    async fn set_avatar(&self, upload: Upload) -> Result<UserModel, ResourceError>;
}

#[async_trait]
impl AccountsServer for AccountsService {
    async fn register(&self, _ctx: RequestContext, new_user: NewUser) -> Result<UserModel, ResourceError> {
        Ok(self._register(new_user).await?)
    }

    async fn login(
        &self,
        ctx: RequestContext,
        email: String,
        password: String,
    ) -> Result<UserModel, ResourceError> {
        Ok(self._login(&email, &password, &auth::node_key(&ctx)).await?)
    }

    async fn logout(&self, ctx: RequestContext) -> Result<(), ResourceError> {
        Ok(self._logout(&auth::node_key(&ctx)).await?)
    }

    async fn me(&self, ctx: RequestContext) -> Result<Principal, ResourceError> {
        Ok(self._principal_for(&auth::node_key(&ctx)).await?)
    }

    async fn list_pending_users(&self, ctx: RequestContext) -> Result<Vec<UserModel>, ResourceError> {
        let admin = auth::principal(&self.db, &ctx).await?;
        Ok(self._list_pending_users(&admin).await?)
    }

    async fn approve_user(&self, ctx: RequestContext, user_id: UserId) -> Result<UserModel, ResourceError> {
        let admin = auth::principal(&self.db, &ctx).await?;
        Ok(self._approve_user(&admin, user_id).await?)
    }

    async fn get_user(&self, _ctx: RequestContext, user_id: UserId) -> Result<UserModel, ResourceError> {
        Ok(self._get_user(user_id).await?)
    }

    async fn set_avatar(&self, ctx: RequestContext, upload: Upload) -> Result<UserModel, ResourceError> {
        let principal = auth::principal(&self.db, &ctx).await?;
        Ok(self._set_avatar(&principal, upload).await?)
    }
}
