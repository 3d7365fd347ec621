// utils/error.rs
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Erreurs de gabarits documentaires
    #[error("Template structure error: {0}")]
    TemplateStructure(String),

    #[error("Unsupported template: {0}")]
    UnsupportedTemplate(String),

    #[error("Config mismatch: template is {attendu}, config is {recu}")]
    ConfigMismatch { attendu: String, recu: String },

    #[error("Template limit reached")]
    TemplateLimitReached,

    // Erreurs du pipeline de génération
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Invalid transition: {de} -> {vers}")]
    InvalidTransition { de: String, vers: String },

    #[error("{message}")]
    Generation { message: String, details: String },

    // Erreurs de ressources
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Erreurs externes
    #[error("Stripe error: {0}")]
    Stripe(String),

    // Erreurs de base de données
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            // 400 - Bad Request
            AppError::Validation(_)
            | AppError::ConfigMismatch { .. } => {
                HttpResponse::BadRequest().json(json!({
                    "error": self.to_string(),
                    "code": "BAD_REQUEST"
                }))
            }

            // 404 - Not Found
            AppError::NotFound(_) => {
                HttpResponse::NotFound().json(json!({
                    "error": self.to_string(),
                    "code": "NOT_FOUND"
                }))
            }

            // 409 - Conflict
            AppError::TemplateLimitReached => {
                HttpResponse::Conflict().json(json!({
                    "error": self.to_string(),
                    "code": "CONFLICT"
                }))
            }

            // 412 - Precondition Failed
            AppError::InvalidTransition { .. } => {
                HttpResponse::PreconditionFailed().json(json!({
                    "error": self.to_string(),
                    "code": "PRECONDITION_FAILED"
                }))
            }

            // 422 - Unprocessable Entity
            AppError::TemplateStructure(_)
            | AppError::UnsupportedTemplate(_) => {
                HttpResponse::UnprocessableEntity().json(json!({
                    "error": self.to_string(),
                    "code": "UNPROCESSABLE_ENTITY"
                }))
            }

            // 502 - Bad Gateway (collaborateur externe)
            AppError::Extraction(_) => {
                HttpResponse::BadGateway().json(json!({
                    "error": self.to_string(),
                    "code": "EXTRACTION_FAILED"
                }))
            }

            // Échec de génération : message lisible + détails techniques
            AppError::Generation { message, details } => {
                tracing::error!("Échec de génération: {} ({})", message, details);
                HttpResponse::InternalServerError().json(json!({
                    "error": message,
                    "details": details,
                    "code": "GENERATION_FAILED"
                }))
            }

            // 500 - Internal Server Error
            _ => {
                tracing::error!("Internal server error: {}", self);
                HttpResponse::InternalServerError().json(json!({
                    "error": "Internal server error",
                    "code": "INTERNAL_ERROR"
                }))
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = err
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let error_messages: Vec<String> = errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect();

        AppError::Validation(messages.join("; "))
    }
}

// Type de résultat standard
pub type Result<T> = std::result::Result<T, AppError>;
