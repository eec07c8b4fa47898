use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

const DEV_JWT_SECRET: &str = "dev-school-jwt-secret";

#[derive(Debug, Clone)]
pub struct SchoolConfig {
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub jwt: JwtConfig,
    pub uploads_dir: String,
    pub otlp_endpoint: Option<String>,
    pub store_backend: StoreBackend,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Secret<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl SchoolConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_production();

        let mongo_uri = match env::var("MONGODB_URI").or_else(|_| env::var("MONGO_URI")) {
            Ok(uri) => uri,
            Err(_) => get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
        };

        let store_backend = get_env("STORE_BACKEND", Some("mongo"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        Ok(SchoolConfig {
            common,
            mongodb: MongoConfig {
                uri: Secret::new(mongo_uri),
                database: get_env("MONGODB_DATABASE", Some("school_db"), false)?,
            },
            jwt: JwtConfig {
                secret: Secret::new(get_env("JWT_SECRET", Some(DEV_JWT_SECRET), is_prod)?),
            },
            uploads_dir: get_env("UPLOADS_DIR", Some("uploads"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            store_backend,
        })
    }

    /// Configuration for tests and local runs: in-memory stores, random port.
    pub fn for_tests(jwt_secret: &str) -> Self {
        SchoolConfig {
            common: core_config::Config {
                port: 0,
                ..core_config::Config::default()
            },
            mongodb: MongoConfig {
                uri: Secret::new("mongodb://localhost:27017".to_string()),
                database: "school_test".to_string(),
            },
            jwt: JwtConfig {
                secret: Secret::new(jwt_secret.to_string()),
            },
            uploads_dir: "uploads".to_string(),
            otlp_endpoint: None,
            store_backend: StoreBackend::Memory,
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
