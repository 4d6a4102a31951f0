pub mod auth;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;
pub mod models;
pub mod pagination;
pub mod service;
pub mod views;

#[cfg(test)]
mod test_utils;

use std::{sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;
use tracing::{info, warn};
use zel_core::{prelude::RpcServerBuilder, IrohBundle};

use crate::{
    config::CampusConfig,
    events::Dispatcher,
    media::{LocalMediaStore, MediaStore},
    service::{
        accounts::AccountsServer, catalog::CatalogServer, comments::CommentsServer,
        likes::LikesServer, notifications::NotificationsServer, posts::PostsServer,
        reports::ReportsServer, Services,
    },
};

pub static ALPN: &[u8] = b"campus_talk::0.1.0";

/// Main runtime handle for Campus Talk.
pub struct CampusCore {
    pub config: CampusConfig,

    pub db: DatabaseConnection,

    /// Server bundle that accepts inbound RPC traffic.
    pub server: IrohBundle,

    pub services: Services,
}

impl CampusCore {
    /// Start with the config found in the platform data directory.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let config = config::get_or_init().await?;
        Self::start_with(config).await
    }

    pub async fn start_with(config: CampusConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!(database = %config.database_path.display(), "starting campus core");

        // DB + migrations
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;
        models::seed::seed_catalog(&db).await?;

        let media: Arc<dyn MediaStore> =
            Arc::new(LocalMediaStore::new(config.settings.media_dir.clone()));
        let services = Services::new(
            db.clone(),
            &config.settings,
            Dispatcher::with_notifications(),
            media,
        );

        let admin = services.accounts.ensure_admin(&config.admin).await?;
        info!(email = %admin.email, "admin account ready");

        // ----------------
        // Server endpoint
        // ----------------
        let mut server_builder = IrohBundle::builder(Some(config.secret_key.clone())).await?;
        let server_endpoint = server_builder.endpoint().clone();

        // Register RPC servers
        let rpc_server_builder = RpcServerBuilder::new(ALPN, server_endpoint.clone());
        let rpc_server_builder = services.accounts.clone().register_service(rpc_server_builder);
        let rpc_server_builder = services.posts.clone().register_service(rpc_server_builder);
        let rpc_server_builder = services.comments.clone().register_service(rpc_server_builder);
        let rpc_server_builder = services.likes.clone().register_service(rpc_server_builder);
        let rpc_server_builder = services
            .notifications
            .clone()
            .register_service(rpc_server_builder);
        let rpc_server_builder = services.reports.clone().register_service(rpc_server_builder);
        let rpc_server_builder = services.catalog.clone().register_service(rpc_server_builder);

        let rpc_server = rpc_server_builder.build();

        let server = server_builder.accept(ALPN, rpc_server).finish().await;

        server.wait_online().await;
        info!(addr = ?server.endpoint.addr(), "rpc server online");

        Ok(Self {
            config,
            db,
            server,
            services,
        })
    }

    pub async fn shutdown(self) -> Result<(), Box<dyn std::error::Error>> {
        // Shutdown server bundle
        self.server.shutdown(Duration::from_secs(5)).await?;

        if let Err(error) = self.db.close().await {
            warn!(%error, "database did not close cleanly");
        }
        Ok(())
    }
}

pub mod prelude {
    pub use super::auth;
    pub use super::config;
    pub use super::entity;
    pub use super::error;
    pub use super::events;
    pub use super::ids;
    pub use super::models;
    pub use super::pagination;

    pub use super::service;

    pub use zel_core;
}
