use std::path::{Path, PathBuf};

use iroh::SecretKey;
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

static DATA_DIR_NAME: &str = "campus_talk";
static CAMPUS_DB_NAME: &str = "campus_db.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";
static MEDIA_DIR_NAME: &str = "media";

// data_dir_path
// |- campus_talk
//    |- campus_db.sqlite
//    |- config.json
//    |- media/

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no data directory on this platform")]
    NoDataDir,
    #[error("config io error")]
    Io(#[from] std::io::Error),
    #[error("malformed config file")]
    Json(#[from] serde_json::Error),
}

fn default_secret_key() -> SecretKey {
    SecretKey::generate(&mut rand::rng())
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Account created on first start so somebody can approve registrations.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdminBootstrap {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Default for AdminBootstrap {
    fn default() -> Self {
        Self {
            name: "Admin".to_string(),
            email: "admin@campus.local".to_string(),
            password: generate_password(),
        }
    }
}

/// Default and maximum page sizes for the list endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PaginationConfig {
    pub posts: u64,
    pub notifications: u64,
    pub comment_details: u64,
    pub reports: u64,
    pub max_per_page: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            posts: 10,
            notifications: 10,
            comment_details: 100,
            reports: 20,
            max_per_page: 100,
        }
    }
}

impl PaginationConfig {
    /// Resolve a requested page size against a default, clamped to `1..=max_per_page`.
    pub fn per_page(&self, requested: Option<u64>, default: u64) -> u64 {
        requested.unwrap_or(default).clamp(1, self.max_per_page.max(1))
    }
}

/// Knobs that shape request handling but carry no secrets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub pagination: PaginationConfig,
    /// A viewer bumps a post's view counter at most once per window.
    pub view_window_minutes: u64,
    /// Deepest reply level returned by the comment tree.
    pub comment_tree_max_depth: usize,
    pub media_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pagination: PaginationConfig::default(),
            view_window_minutes: 60,
            comment_tree_max_depth: 32,
            media_dir: PathBuf::from(MEDIA_DIR_NAME),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CampusConfig {
    /// Secret key for the local node.
    #[serde(default = "default_secret_key")]
    pub(crate) secret_key: SecretKey,

    pub(crate) database_path: PathBuf,

    #[serde(default)]
    pub admin: AdminBootstrap,

    #[serde(default)]
    pub settings: Settings,
}

impl CampusConfig {
    /// Creates a new CampusConfig with a generated secret key rooted at `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        let settings = Settings {
            media_dir: data_dir.join(MEDIA_DIR_NAME),
            ..Settings::default()
        };

        CampusConfig {
            secret_key: default_secret_key(),
            database_path: data_dir.join(CAMPUS_DB_NAME),
            admin: AdminBootstrap::default(),
            settings,
        }
    }
}

/// Gets the existing config or initializes a new one if it doesn't exist
pub async fn get_or_init() -> Result<CampusConfig, ConfigError> {
    let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    load_or_create(&data_dir.join(DATA_DIR_NAME)).await
}

/// Same as [`get_or_init`] but rooted at an explicit directory.
pub async fn load_or_create(campus_dir: &Path) -> Result<CampusConfig, ConfigError> {
    let config_path = campus_dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(campus_dir).await?;

    if fs::try_exists(&config_path).await? {
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: CampusConfig = serde_json::from_str(&contents)?;
        Ok(config)
    } else {
        let config = CampusConfig::new(campus_dir);

        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        Ok(config)
    }
}
