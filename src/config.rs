use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub cors_origin: Option<String>,
    /// Record the caller-supplied unit price on each sale line (legacy
    /// behavior, supports price overrides at the till). When false the
    /// authoritative product price is used instead.
    pub trust_client_price: bool,
    /// Skip the stock >= qty guard on sale, letting stock go negative.
    pub allow_negative_stock: bool,
    pub upload_dir: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let cors_origin = env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty());
        let trust_client_price = env_flag("TRUST_CLIENT_PRICE", true);
        let allow_negative_stock = env_flag("ALLOW_NEGATIVE_STOCK", false);
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            cors_origin,
            trust_client_price,
            allow_negative_stock,
            upload_dir,
        })
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}
