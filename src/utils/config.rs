// utils/config.rs
use crate::utils::error::{AppError, Result};
use dotenv::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Environnement et serveur
    pub run_mode: String,
    pub server_host: String,
    pub server_port: u16,
    pub workers: usize,
    pub log_level: String,

    // Base de données
    pub database_url: String,
    pub database_max_connections: u32,

    // MinIO/S3
    pub storage_type: String,
    pub minio_endpoint: Option<String>,
    pub minio_access_key: Option<String>,
    pub minio_secret_key: Option<String>,
    pub minio_bucket: String,
    pub minio_region: String,
    pub local_storage_dir: String,
    pub max_file_size_mb: u64,

    // Extraction IA
    pub extraction_endpoint: Option<String>,
    pub extraction_api_key: Option<String>,
    pub extraction_model: String,
    pub extraction_timeout_seconds: u64,

    // Génération
    pub generation_timeout_seconds: u64,

    // Rétention
    pub propositions_conservees: i64,

    // Stripe
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_currency: String,

    // URLs
    pub frontend_url: String,
}

impl Config {
    /// Charger la configuration depuis les variables d'environnement
    pub fn from_env() -> Result<Self> {
        // Charger le fichier .env si présent
        let _ = dotenv().ok();

        // Variables requises
        let required_vars = [
            "DATABASE_URL",
            "MINIO_BUCKET",
        ];

        for var in &required_vars {
            if env::var(var).is_err() {
                return Err(AppError::Validation(format!(
                    "Variable d'environnement requise manquante: {}", var
                )));
            }
        }

        let config = Config {
            // Environnement et serveur
            run_mode: env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 8080)?,
            workers: parse_var("WORKERS", 4)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            // Base de données
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,

            // MinIO/S3
            storage_type: env::var("STORAGE_TYPE").unwrap_or_else(|_| "local".to_string()),
            minio_endpoint: env::var("MINIO_ENDPOINT").ok(),
            minio_access_key: env::var("MINIO_ACCESS_KEY").ok(),
            minio_secret_key: env::var("MINIO_SECRET_KEY").ok(),
            minio_bucket: env::var("MINIO_BUCKET").unwrap_or_default(),
            minio_region: env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            local_storage_dir: env::var("LOCAL_STORAGE_DIR")
                .unwrap_or_else(|_| "./storage".to_string()),
            max_file_size_mb: parse_var("MAX_FILE_SIZE_MB", 25)?,

            // Extraction IA
            extraction_endpoint: env::var("EXTRACTION_ENDPOINT").ok(),
            extraction_api_key: env::var("EXTRACTION_API_KEY").ok(),
            extraction_model: env::var("EXTRACTION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            extraction_timeout_seconds: parse_var("EXTRACTION_TIMEOUT_SECONDS", 60)?,

            // Génération
            generation_timeout_seconds: parse_var("GENERATION_TIMEOUT_SECONDS", 120)?,

            // Rétention
            propositions_conservees: parse_var("PROPOSITIONS_CONSERVEES", 20)?,

            // Stripe
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
            stripe_currency: env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "eur".to_string()),

            // URLs
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Valider les paramètres critiques
    fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            return Err(AppError::Validation("Port serveur invalide".to_string()));
        }

        if self.propositions_conservees < 1 {
            return Err(AppError::Validation(
                "PROPOSITIONS_CONSERVEES doit être >= 1".to_string(),
            ));
        }

        if self.storage_type == "s3" {
            if self.minio_endpoint.is_none()
                || self.minio_access_key.is_none()
                || self.minio_secret_key.is_none()
            {
                return Err(AppError::Validation(
                    "Configuration S3 incomplète (MINIO_ENDPOINT, MINIO_ACCESS_KEY, MINIO_SECRET_KEY)".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Parser une variable d'environnement avec valeur par défaut
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value.parse::<T>().map_err(|_| {
            AppError::Validation(format!("Variable d'environnement invalide: {}", name))
        }),
        Err(_) => Ok(default),
    }
}
