use axum::{
    extract::{Json, State},
    http::{header, HeaderMap},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::{
    analyzer::ContextSource,
    app_state::AppState,
    cache::{CachePurpose, ContextCache},
    diagram::DiagramKind,
    error::{AnalyzerError, AnalyzerResult},
    github::{RepositorySummary, DEFAULT_CODE_PATH},
    models::{SkippedFile, SourceInput, VIRTUAL_ROOT},
};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramPayload {
    analysis_type: Option<String>,
    repo_url: Option<String>,
    github_token: Option<String>,
    code_path: Option<String>,
    #[serde(default)]
    files: Vec<SourceInput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    #[serde(default)]
    question: String,
    repo_url: Option<String>,
    github_token: Option<String>,
    code_path: Option<String>,
    #[serde(default)]
    files: Vec<SourceInput>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramResponse {
    mermaid_code: String,
    skipped_files: Vec<SkippedFile>,
}

#[derive(Serialize)]
pub struct QuestionResponse {
    answer: String,
}

/// De dónde salen los ficheros de una petición.
enum RequestSource {
    Inline(Vec<SourceInput>),
    Repository {
        repo_url: String,
        token: String,
        code_path: String,
    },
}

impl RequestSource {
    fn resolve(
        files: Vec<SourceInput>,
        repo_url: Option<String>,
        github_token: Option<String>,
        code_path: Option<String>,
    ) -> AnalyzerResult<Self> {
        if !files.is_empty() {
            return Ok(Self::Inline(files));
        }
        let repo_url = repo_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AnalyzerError::bad_request("La URL del repositorio es obligatoria"))?;
        let token = github_token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| AnalyzerError::bad_request("El token de GitHub es obligatorio"))?;
        let code_path = code_path
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CODE_PATH.to_string());

        Ok(Self::Repository {
            repo_url,
            token,
            code_path,
        })
    }

    fn cache_key(&self, purpose: CachePurpose) -> Option<String> {
        match self {
            Self::Inline(_) => None,
            Self::Repository {
                repo_url,
                code_path,
                ..
            } => Some(ContextCache::key(repo_url, code_path, purpose)),
        }
    }

    async fn files(self, state: &AppState) -> AnalyzerResult<Vec<SourceInput>> {
        match self {
            Self::Inline(files) => Ok(files),
            Self::Repository {
                repo_url,
                token,
                code_path,
            } => {
                let downloaded = state
                    .github
                    .fetch_files(&repo_url, &token, Some(&code_path))
                    .await?;
                Ok(downloaded.into_iter().map(SourceInput::from).collect())
            }
        }
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/ai-code-analyzer/diagrams", post(diagrams_handler))
        .route("/api/ai-code-analyzer/questions", post(questions_handler))
        .route("/api/github/repos", get(repositories_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[axum::debug_handler]
async fn diagrams_handler(
    State(state): State<AppState>,
    Json(payload): Json<DiagramPayload>,
) -> Result<Json<DiagramResponse>, AnalyzerError> {
    let span = info_span!("diagram", request_id = %Uuid::new_v4());
    generate_diagram(state, payload).instrument(span).await.map(Json)
}

async fn generate_diagram(
    state: AppState,
    payload: DiagramPayload,
) -> AnalyzerResult<DiagramResponse> {
    let kind = match payload.analysis_type.as_deref() {
        None | Some("") => DiagramKind::default(),
        Some(other) => DiagramKind::parse(other).ok_or_else(|| {
            AnalyzerError::bad_request(format!("Tipo de análisis no soportado: {other}"))
        })?,
    };
    info!(
        "Petición de diagrama {}. Repo: {:?}. Ruta: {:?}",
        kind.keyword(),
        payload.repo_url,
        payload.code_path
    );

    let source = RequestSource::resolve(
        payload.files,
        payload.repo_url,
        payload.github_token,
        payload.code_path,
    )?;

    let files = source.files(&state).await?;
    let diagram = state.analyzer.generate_diagram(&files, kind).await?;

    Ok(DiagramResponse {
        mermaid_code: diagram.mermaid_code,
        skipped_files: diagram.skipped,
    })
}

#[axum::debug_handler]
async fn questions_handler(
    State(state): State<AppState>,
    Json(payload): Json<QuestionPayload>,
) -> Result<Json<QuestionResponse>, AnalyzerError> {
    let span = info_span!("question", request_id = %Uuid::new_v4());
    answer_question(state, payload).instrument(span).await.map(Json)
}

async fn answer_question(
    state: AppState,
    payload: QuestionPayload,
) -> AnalyzerResult<QuestionResponse> {
    if payload.question.trim().is_empty() {
        return Err(AnalyzerError::bad_request("La pregunta es obligatoria"));
    }
    info!("Pregunta recibida: {}", payload.question);

    let source = RequestSource::resolve(
        payload.files,
        payload.repo_url,
        payload.github_token,
        payload.code_path,
    )?;

    let cache_key = source.cache_key(CachePurpose::Questions);
    if let Some(context) = cache_key.as_deref().and_then(|key| state.cache.get(key)) {
        info!("Contexto de código servido desde la caché");
        let result = state
            .analyzer
            .answer_question(&payload.question, ContextSource::Cached(context))
            .await?;
        return Ok(QuestionResponse {
            answer: display_paths(&result.answer),
        });
    }

    let files = source.files(&state).await?;
    let result = state
        .analyzer
        .answer_question(&payload.question, ContextSource::Files(&files))
        .await?;

    if let Some(key) = cache_key {
        state.cache.set(key, result.context, None);
    }

    Ok(QuestionResponse {
        answer: display_paths(&result.answer),
    })
}

#[axum::debug_handler]
async fn repositories_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RepositorySummary>>, AnalyzerError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AnalyzerError::Unauthorized("Token de GitHub inválido o ausente".into()))?;

    let repositories = state.github.list_repositories(token).await?;
    Ok(Json(repositories))
}

// --- Utilidades ---

/// Sustituye las rutas virtuales del contexto por las rutas que ve el usuario.
fn display_paths(answer: &str) -> String {
    answer.replace(VIRTUAL_ROOT, "")
}
