//! Caller identity.
//!
//! Every service operation that depends on who is asking takes a
//! [`Principal`] (or a [`Viewer`] for operations open to anonymous callers)
//! as an explicit argument. The RPC layer builds one from the connection's
//! node key via the `session` table, which `login` fills.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sea_orm::{ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};
use zel_core::prelude::RequestContext;

use crate::{
    entity::prelude::*,
    error::{ServiceError, ServiceResult},
    ids::UserId,
};

/// An authenticated, approved user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owner of a resource, or an admin.
    pub fn can_moderate(&self, owner: UserId) -> bool {
        self.id == owner || self.is_admin()
    }

    pub fn require_admin(&self) -> ServiceResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("admin only"))
        }
    }
}

impl From<&UserModel> for Principal {
    fn from(user: &UserModel) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// Whoever is reading a post. Anonymous viewers are keyed by their address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Viewer {
    User(UserId),
    Anonymous(String),
}

impl Viewer {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Viewer::User(id) => Some(*id),
            Viewer::Anonymous(_) => None,
        }
    }

    pub fn key(&self) -> String {
        match self {
            Viewer::User(id) => format!("user:{id}"),
            Viewer::Anonymous(addr) => format!("anon:{addr}"),
        }
    }
}

impl From<&Principal> for Viewer {
    fn from(principal: &Principal) -> Self {
        Viewer::User(principal.id)
    }
}

pub fn hash_password(password: &str) -> ServiceResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ServiceError::validation("password could not be hashed"))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Key the session table by the remote node of an RPC call.
pub fn node_key(ctx: &RequestContext) -> Vec<u8> {
    ctx.connection().remote_id().as_bytes().to_vec()
}

/// Resolve the logged-in, approved user bound to `node_id`.
pub async fn principal_for_node<C: ConnectionTrait>(
    db: &C,
    node_id: &[u8],
) -> ServiceResult<Principal> {
    let session = Session::find_by_id(node_id.to_vec())
        .one(db)
        .await?
        .ok_or(ServiceError::Unauthenticated)?;

    let user = User::find_by_id(session.user_id)
        .one(db)
        .await?
        .ok_or(ServiceError::Unauthenticated)?;

    if !user.is_approved {
        return Err(ServiceError::Unapproved);
    }

    Ok(Principal::from(&user))
}

/// Principal of the calling connection.
pub async fn principal<C: ConnectionTrait>(db: &C, ctx: &RequestContext) -> ServiceResult<Principal> {
    principal_for_node(db, &node_key(ctx)).await
}

/// Viewer of the calling connection: the logged-in user if there is one.
pub async fn viewer<C: ConnectionTrait>(db: &C, ctx: &RequestContext) -> ServiceResult<Viewer> {
    match principal(db, ctx).await {
        Ok(principal) => Ok(Viewer::from(&principal)),
        Err(ServiceError::Unauthenticated) | Err(ServiceError::Unapproved) => Ok(
            Viewer::Anonymous(ctx.connection().remote_id().to_string()),
        ),
        Err(error) => Err(error),
    }
}
