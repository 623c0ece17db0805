use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub upload_dir: String,
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub token_sweep_interval_secs: u64,
    pub rate_limit_default: u32,
    pub rate_limit_ai: u32,
    pub admin_email: String,
    pub admin_password: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ai_model: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./gradeflow.db".to_string());

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());

        let secret_key = std::env::var("SECRET_KEY")
            .unwrap_or_else(|_| "dev-secret-change-in-production-minimum-32-characters".to_string());

        let access_token_expire_minutes = std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let token_sweep_interval_secs = std::env::var("TOKEN_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let rate_limit_default = std::env::var("RATE_LIMIT_DEFAULT")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let rate_limit_ai = std::env::var("RATE_LIMIT_AI_ENDPOINTS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let admin_email =
            std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@gradeflow.local".to_string());

        let admin_password =
            std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string());

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let ai_model =
            std::env::var("AI_MODEL").unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string());

        Ok(Self {
            host,
            port,
            database_path,
            upload_dir,
            secret_key,
            access_token_expire_minutes,
            token_sweep_interval_secs,
            rate_limit_default,
            rate_limit_ai,
            admin_email,
            admin_password,
            anthropic_api_key,
            openai_api_key,
            ai_model,
        })
    }
}

/// Offset pagination parameters accepted by list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    /// Clamp to sane bounds: page >= 1, 1 <= per_page <= 100
    pub fn normalize(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(10).clamp(1, 100);
        (page, per_page)
    }

    pub fn offset(&self) -> u32 {
        let (page, per_page) = self.normalize();
        (page - 1) * per_page
    }
}

/// Number of pages needed for `total` rows at `per_page` rows each.
pub fn total_pages(total: i64, per_page: u32) -> i64 {
    (total + per_page as i64 - 1) / per_page as i64
}
