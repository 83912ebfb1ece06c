// src/config.rs

use std::{env, path::PathBuf, str::FromStr};

use dotenvy::dotenv;
use url::Url;

use crate::{error::AppError, utils::image::ImageLimits};

/// Duration used when a quiz carries no positive duration.
pub const DEFAULT_DURATION_MINUTES: i32 = 10;

/// Size of the cross-quiz leaderboard for the current day.
pub const DAILY_LEADERBOARD_LIMIT: i64 = 10;

/// Upper bound of the admin quiz listing.
pub const ADMIN_QUIZ_LIST_LIMIT: i64 = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,

    /// Root directory of the local object store, served under `/uploads`.
    pub upload_dir: PathBuf,
    /// Prefix every public image reference is joined onto.
    pub public_base_url: Url,

    /// Seconds between background session saves while a quiz is running.
    pub autosave_interval_secs: u64,
    /// Uploaded images are scaled down until both `IMAGE_MAX_WIDTH` and
    /// `IMAGE_MAX_HEIGHT` hold, keeping their aspect ratio.
    pub image_limits: ImageLimits,
    /// Size of the per-quiz leaderboard window.
    pub leaderboard_limit: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/uploads/".to_string());
        let public_base_url = Url::parse(&public_base_url)
            .map_err(|e| AppError::InternalServerError(format!("PUBLIC_BASE_URL: {}", e)))?;

        let defaults = ImageLimits::default();

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            port: parsed("PORT", 3000)?,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            public_base_url,
            autosave_interval_secs: parsed("AUTOSAVE_INTERVAL_SECS", 15)?,
            image_limits: ImageLimits {
                max_width: parsed("IMAGE_MAX_WIDTH", defaults.max_width)?,
                max_height: parsed("IMAGE_MAX_HEIGHT", defaults.max_height)?,
                quality: parsed("IMAGE_QUALITY", defaults.quality)?,
            },
            leaderboard_limit: parsed("LEADERBOARD_LIMIT", 15)?,
        })
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::InternalServerError(format!("{} must be set", key)))
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::InternalServerError(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
