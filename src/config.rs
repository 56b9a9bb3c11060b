use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_port: u16,
    pub media_dir: String,
    pub max_upload_bytes: u64,
    pub membership_lookback_days: i64,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables, applying defaults where appropriate.
    ///
    /// # Errors
    /// Returns an error if mandatory variables (`DATABASE_URL`, `JWT_SECRET`) are missing or invalid,
    /// or if numeric parsing fails.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let server_port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let media_dir = std::env::var("MEDIA_DIR").unwrap_or_else(|_| "media".to_string());
        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5 * 1024 * 1024); // 5MB
        // Fixed payment-recency window for membership checks, independent of the
        // purchased plan length. See DESIGN.md.
        let membership_lookback_days = std::env::var("MEMBERSHIP_LOOKBACK_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(365);
        let admin_username = std::env::var("ADMIN_USERNAME")
            .ok()
            .filter(|v| !v.is_empty());
        let admin_password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            jwt_secret,
            server_port,
            media_dir,
            max_upload_bytes,
            membership_lookback_days,
            admin_username,
            admin_password,
        })
    }

    /// Directory where uploaded book cover images land.
    #[must_use]
    pub fn covers_dir(&self) -> String {
        format!("{}/book_covers", self.media_dir)
    }

    /// Directory where uploaded book PDFs land.
    #[must_use]
    pub fn pdfs_dir(&self) -> String {
        format!("{}/book_pdfs", self.media_dir)
    }
}
