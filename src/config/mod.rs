use std::env;

use crate::error::{Error, Result};
use crate::store::fields::FieldSchema;

/// Which record store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    Vika,
    Supabase,
    #[default]
    Memory,
}

impl Backend {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "vika" => Ok(Backend::Vika),
            "supabase" => Ok(Backend::Supabase),
            "memory" => Ok(Backend::Memory),
            other => Err(Error::Config(format!(
                "unknown backend {other:?}, expected vika, supabase or memory"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VikaConfig {
    pub api_token: String,
    pub base_url: String,
    pub schedule_sheet: String,
    pub user_sheet: String,
    pub profile_sheet: String,
    pub hotel_sheet: String,
    pub shop_sheet: String,
    pub field_schema: FieldSchema,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: Backend,
    pub port: u16,
    pub jwt_secret: String,
    pub allowed_origins: Vec<String>,
    pub production: bool,
    pub vika: Option<VikaConfig>,
    pub supabase: Option<SupabaseConfig>,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Reads configuration from the environment. A `.env` file is loaded
    /// first if present. Production refuses to start on a missing or
    /// default secret; development falls back to an insecure one.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let production = optional("APP_ENV").as_deref() == Some("production");

        let backend = match optional("SHIFTDESK_BACKEND") {
            Some(value) => Backend::parse(&value)?,
            None => Backend::Memory,
        };

        let port = match optional("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| Error::Config(format!("invalid PORT {value:?}")))?,
            None => 3001,
        };

        let jwt_secret = match optional("JWT_SECRET") {
            Some(secret) => secret,
            None if production => {
                return Err(Error::Config(
                    "JWT_SECRET must be set in production".into(),
                ));
            }
            None => {
                tracing::warn!("JWT_SECRET not set, using an insecure development secret");
                "dev-secret-do-not-use".to_string()
            }
        };

        let allowed_origins = optional("ALLOWED_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let vika = if backend == Backend::Vika {
            let api_token = optional("VIKA_API_TOKEN")
                .ok_or_else(|| Error::Config("VIKA_API_TOKEN must be set".into()))?;
            let default_sheet = optional("VIKA_DATASHEET_ID")
                .ok_or_else(|| Error::Config("VIKA_DATASHEET_ID must be set".into()))?;
            let sheet = |key: &str| optional(key).unwrap_or_else(|| default_sheet.clone());
            Some(VikaConfig {
                api_token,
                base_url: optional("VIKA_BASE_URL")
                    .unwrap_or_else(|| "https://vika.cn/fusion/v1".to_string()),
                schedule_sheet: sheet("VIKA_SCHEDULE_DATASHEET_ID"),
                user_sheet: default_sheet.clone(),
                profile_sheet: sheet("VIKA_PROFILE_DATASHEET_ID"),
                hotel_sheet: sheet("VIKA_HOTEL_DATASHEET_ID"),
                shop_sheet: sheet("VIKA_SHOP_DATASHEET_ID"),
                field_schema: {
                    let raw = optional("VIKA_FIELD_SCHEMA").unwrap_or_else(|| "legacy".into());
                    FieldSchema::parse(&raw).ok_or_else(|| {
                        Error::Config(format!(
                            "unknown VIKA_FIELD_SCHEMA {raw:?}, expected legacy or v2"
                        ))
                    })?
                },
            })
        } else {
            None
        };

        let supabase = if backend == Backend::Supabase {
            let url = optional("SUPABASE_URL")
                .ok_or_else(|| Error::Config("SUPABASE_URL must be set".into()))?;
            let api_key = optional("SUPABASE_SERVICE_ROLE_KEY")
                .or_else(|| optional("SUPABASE_ANON_KEY"))
                .ok_or_else(|| {
                    Error::Config(
                        "SUPABASE_SERVICE_ROLE_KEY or SUPABASE_ANON_KEY must be set".into(),
                    )
                })?;
            Some(SupabaseConfig { url, api_key })
        } else {
            None
        };

        Ok(Self {
            backend,
            port,
            jwt_secret,
            allowed_origins,
            production,
            vika,
            supabase,
        })
    }

    /// Configuration for tests and local tooling.
    pub fn for_tests() -> Self {
        Self {
            backend: Backend::Memory,
            port: 0,
            jwt_secret: "test-secret".to_string(),
            allowed_origins: Vec::new(),
            production: false,
            vika: None,
            supabase: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!(Backend::parse("vika").unwrap(), Backend::Vika);
        assert_eq!(Backend::parse("supabase").unwrap(), Backend::Supabase);
        assert_eq!(Backend::parse("memory").unwrap(), Backend::Memory);
        assert!(Backend::parse("postgres").is_err());
    }
}
