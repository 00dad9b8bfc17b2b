use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2id work-factor knobs. Raising these slows every hash and verify,
/// which is the point.
#[derive(Debug, Clone, Deserialize)]
pub struct KdfConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    pub ttl_minutes: i64,
    /// Base URL embedded into the reset link sent by email.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub kdf: KdfConfig,
    pub reset: ResetConfig,
    pub smtp: Option<SmtpConfig>,
    pub facebook_graph_url: String,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "townsq".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "townsq-users".into()),
            ttl_minutes: env_parsed("JWT_TTL_MINUTES", 60 * 24 * 7),
        };
        let kdf = KdfConfig {
            memory_kib: env_parsed("KDF_MEMORY_KIB", 19 * 1024),
            iterations: env_parsed("KDF_ITERATIONS", 2),
            parallelism: env_parsed("KDF_PARALLELISM", 1),
        };
        let reset = ResetConfig {
            ttl_minutes: env_parsed("RESET_TTL_MINUTES", 60),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
        };
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env_parsed("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
                from: std::env::var("SMTP_FROM")
                    .unwrap_or_else(|_| "no-reply@townsq.local".into()),
            }),
            Err(_) => None,
        };
        let facebook_graph_url = std::env::var("FACEBOOK_GRAPH_URL")
            .unwrap_or_else(|_| "https://graph.facebook.com".into());
        Ok(Self {
            database_url,
            jwt,
            kdf,
            reset,
            smtp,
            facebook_graph_url,
        })
    }
}
