//! Taxonomía de errores visible para el cliente y su traducción a respuestas HTTP.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type AnalyzerResult<T> = std::result::Result<T, AnalyzerError>;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Falta un campo obligatorio o su valor no es válido.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    /// El estimador de tokens supera el techo configurado.
    #[error(
        "El código es demasiado grande para analizarlo (estimados {estimated} tokens, máximo {max}). Reduce el número de ficheros o elige una ruta más concreta."
    )]
    TokenLimitExceeded { estimated: usize, max: usize },

    #[error(
        "El tamaño total de los ficheros ({}KB) supera el máximo permitido ({}KB). Elige un repositorio más pequeño o una ruta más concreta.",
        .total_size / 1024,
        .max_size / 1024
    )]
    RepositoryTooLarge { total_size: usize, max_size: usize },

    #[error(
        "El repositorio contiene {count} ficheros, más que el máximo de {max}. Elige una ruta más concreta."
    )]
    TooManyFiles { count: usize, max: usize },

    /// Fallo de la fuente de ficheros (API REST de GitHub).
    #[error("{0}")]
    Repository(String),

    /// Fallo del LLM u otro servicio externo. El mensaje es genérico; la causa se registra.
    #[error("{message}")]
    Upstream {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AnalyzerError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn upstream(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Upstream {
            message: message.into(),
            source: cause.into(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "Bad Request",
            Self::Unauthorized(_) => "Unauthorized",
            Self::TokenLimitExceeded { .. } => "Token limit exceeded",
            Self::RepositoryTooLarge { .. } => "Repository size too large",
            Self::TooManyFiles { .. } => "Too many files",
            Self::Repository(_) => "GitHub Repository Error",
            Self::Upstream { .. } => "Analysis Error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::TokenLimitExceeded { .. }
            | Self::RepositoryTooLarge { .. }
            | Self::TooManyFiles { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Repository(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AnalyzerError {
    fn into_response(self) -> axum::response::Response {
        let mut body = json!({
            "error": self.label(),
            "message": self.to_string(),
        });

        match &self {
            Self::TokenLimitExceeded { estimated, max } => {
                body["estimatedTokens"] = json!(estimated);
                body["maxTokens"] = json!(max);
            }
            Self::RepositoryTooLarge { total_size, max_size } => {
                body["totalSize"] = json!(total_size);
                body["maxSize"] = json!(max_size);
            }
            Self::TooManyFiles { count, max } => {
                body["fileCount"] = json!(count);
                body["maxFiles"] = json!(max);
            }
            Self::Upstream { message, source } => {
                error!("{}: {}", message, source);
            }
            _ => {}
        }

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_error_carries_estimate_and_ceiling() {
        let err = AnalyzerError::TokenLimitExceeded { estimated: 120_000, max: 90_000 };
        let msg = err.to_string();
        assert!(msg.contains("120000"));
        assert!(msg.contains("90000"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_error_hides_the_cause_from_the_message() {
        let err = AnalyzerError::upstream(
            "No se pudo generar el diagrama",
            anyhow::anyhow!("rate limit: 429"),
        );
        assert_eq!(err.to_string(), "No se pudo generar el diagrama");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("rate limit: 429"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn response_body_includes_numeric_details() {
        let response = AnalyzerError::TooManyFiles { count: 31, max: 20 }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Too many files");
        assert_eq!(body["fileCount"], 31);
        assert_eq!(body["maxFiles"], 20);
    }
}
