//! Cliente mínimo de la API REST de GitHub: listado de repositorios y descarga
//! de los ficheros de código de una ruta.

use std::path::Path;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::models::SourceInput;

/// Ruta por defecto cuando la petición no indica ninguna.
pub const DEFAULT_CODE_PATH: &str = "./src";

const VALID_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "java", "py", "html", "css", "json", "md", "php", "go", "rb", "rs",
    "c", "cpp", "h", "hpp", "cs", "swift", "kt", "kts", "scala", "sh", "bash",
];

/// Resumen de un repositorio del usuario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub clone_url: String,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Contents {
    Directory(Vec<ContentItem>),
    File(ContentItem),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// Fichero descargado listo para el análisis.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: String,
    pub content: String,
}

impl DownloadedFile {
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

impl From<DownloadedFile> for SourceInput {
    fn from(file: DownloadedFile) -> Self {
        SourceInput::new(file.path, file.content)
    }
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    max_files: usize,
    max_total_size: usize,
    max_depth: usize,
}

impl GithubClient {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_url: cfg.github_api_url.trim_end_matches('/').to_string(),
            max_files: cfg.github_max_files,
            max_total_size: cfg.github_max_total_size,
            max_depth: cfg.github_max_depth,
        })
    }

    /// Repositorios del usuario, ordenados por última actualización.
    pub async fn list_repositories(&self, token: &str) -> AnalyzerResult<Vec<RepositorySummary>> {
        let response = self
            .http
            .get(format!("{}/user/repos", self.api_url))
            .header(header::AUTHORIZATION, format!("token {token}"))
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .query(&[("sort", "updated"), ("per_page", "100")])
            .send()
            .await
            .map_err(|e| {
                error!("Error consultando repositorios de GitHub: {}", e);
                AnalyzerError::Repository("No se pudieron obtener los repositorios de GitHub".into())
            })?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AnalyzerError::Unauthorized(
                "Token de GitHub inválido o caducado".into(),
            ));
        }

        response
            .error_for_status()
            .map_err(|e| AnalyzerError::Repository(format!("GitHub respondió con error: {e}")))?
            .json::<Vec<RepositorySummary>>()
            .await
            .map_err(|e| {
                AnalyzerError::Repository(format!("Respuesta de repositorios no válida: {e}"))
            })
    }

    /// Descarga los ficheros de código de `code_path` (por defecto `./src`) en
    /// la rama por defecto del repositorio y aplica los límites de tamaño.
    pub async fn fetch_files(
        &self,
        repo_url: &str,
        token: &str,
        code_path: Option<&str>,
    ) -> AnalyzerResult<Vec<DownloadedFile>> {
        let repo = parse_repo_url(repo_url)?;
        let branch = self.default_branch(&repo, token).await?;
        let path = normalize_path(code_path.unwrap_or(DEFAULT_CODE_PATH));

        let items = self
            .list_files_recursively(&repo, path.to_string(), &branch, token, 0)
            .await?;
        info!(
            "{} ficheros candidatos en {}/{} ({})",
            items.len(),
            repo.owner,
            repo.repo,
            path
        );

        let files = self.download_files(&items, token).await;
        check_limits(&files, self.max_total_size, self.max_files)?;
        Ok(files)
    }

    async fn default_branch(&self, repo: &RepoRef, token: &str) -> AnalyzerResult<String> {
        let url = format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.repo);
        let info: RepoInfo = self.get_json(&url, token, None).await.map_err(|e| {
            error!("Error obteniendo información del repositorio: {}", e);
            AnalyzerError::Repository(
                "No se pudo obtener la información del repositorio".into(),
            )
        })?;
        Ok(info.default_branch)
    }

    fn list_files_recursively<'a>(
        &'a self,
        repo: &'a RepoRef,
        path: String,
        branch: &'a str,
        token: &'a str,
        depth: usize,
    ) -> BoxFuture<'a, AnalyzerResult<Vec<ContentItem>>> {
        async move {
            if depth > self.max_depth {
                warn!("Profundidad máxima alcanzada en la ruta: {}", path);
                return Ok(Vec::new());
            }

            let url = format!(
                "{}/repos/{}/{}/contents/{}",
                self.api_url, repo.owner, repo.repo, path
            );
            info!("Descargando contenido {}", url);
            let contents: Contents = self
                .get_json(&url, token, Some(branch))
                .await
                .map_err(|e| {
                    warn!("Error obteniendo ficheros de la ruta {}: {}", path, e);
                    AnalyzerError::Repository(format!(
                        "Error obteniendo ficheros de la ruta {path}: {e}"
                    ))
                })?;

            let mut files = Vec::new();
            match contents {
                Contents::Directory(items) => {
                    for item in items {
                        if item.kind == "file" && is_valid_file_type(&item.name) {
                            files.push(item);
                        } else if item.kind == "dir" {
                            let nested = self
                                .list_files_recursively(repo, item.path, branch, token, depth + 1)
                                .await?;
                            files.extend(nested);
                        }
                    }
                }
                Contents::File(item) => {
                    if item.kind == "file" && is_valid_file_type(&item.name) {
                        files.push(item);
                    }
                }
            }
            Ok(files)
        }
        .boxed()
    }

    /// Los fallos de descarga de un fichero concreto se registran y se omiten.
    async fn download_files(&self, items: &[ContentItem], token: &str) -> Vec<DownloadedFile> {
        let mut downloaded = Vec::with_capacity(items.len());

        for item in items {
            let Some(download_url) = item.download_url.as_deref() else {
                warn!("{} no tiene download_url; se omite", item.path);
                continue;
            };

            let result = async {
                self.http
                    .get(download_url)
                    .header(header::AUTHORIZATION, format!("token {token}"))
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await
            }
            .await;

            match result {
                Ok(content) => downloaded.push(DownloadedFile {
                    path: item.path.clone(),
                    content,
                }),
                Err(e) => error!("Error descargando el fichero {}: {}", item.path, e),
            }
        }

        downloaded
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        git_ref: Option<&str>,
    ) -> anyhow::Result<T> {
        let mut request = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, format!("token {token}"))
            .header(header::ACCEPT, "application/vnd.github.v3+json");
        if let Some(git_ref) = git_ref {
            request = request.query(&[("ref", git_ref)]);
        }
        Ok(request.send().await?.error_for_status()?.json::<T>().await?)
    }
}

/// Extrae propietario y repositorio de una URL de GitHub (`.git` final eliminado).
pub fn parse_repo_url(repo_url: &str) -> AnalyzerResult<RepoRef> {
    let invalid = || AnalyzerError::bad_request("URL de repositorio de GitHub inválida");
    let url = Url::parse(repo_url).map_err(|_| invalid())?;
    let mut segments = url
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|segment| !segment.is_empty());

    let owner = segments.next().ok_or_else(invalid)?;
    let repo = segments.next().ok_or_else(invalid)?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if repo.is_empty() {
        return Err(invalid());
    }

    Ok(RepoRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

pub fn normalize_path(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path).trim_matches('/')
}

pub fn is_valid_file_type(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VALID_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Primero el tamaño total, después el número de ficheros.
pub fn check_limits(
    files: &[DownloadedFile],
    max_total_size: usize,
    max_files: usize,
) -> AnalyzerResult<()> {
    let total_size: usize = files.iter().map(DownloadedFile::size).sum();
    if total_size > max_total_size {
        return Err(AnalyzerError::RepositoryTooLarge {
            total_size,
            max_size: max_total_size,
        });
    }
    if files.len() > max_files {
        return Err(AnalyzerError::TooManyFiles {
            count: files.len(),
            max: max_files,
        });
    }
    Ok(())
}
