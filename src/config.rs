//! Carga y gestión de configuración de la aplicación (servidor, LLM, GitHub y caché).

use std::env;
use std::str::FromStr;
use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub static_dir: String,
    pub open_browser: bool,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    pub llm_temperature: f64,
    pub llm_max_output_tokens: u64,

    /// Techo del estimador de tokens aplicado antes de cualquier llamada al LLM.
    pub max_input_tokens: usize,
    pub cache_ttl_secs: u64,

    pub github_api_url: String,
    pub github_max_files: usize,
    pub github_max_total_size: usize,
    pub github_max_depth: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3322".to_string(),
            static_dir: "public".to_string(),
            open_browser: false,
            llm_provider: LlmProvider::OpenAI,
            llm_chat_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.2,
            llm_max_output_tokens: 4000,
            max_input_tokens: 90_000,
            cache_ttl_secs: 3600,
            github_api_url: "https://api.github.com".to_string(),
            github_max_files: 20,
            github_max_total_size: 500 * 1024,
            github_max_depth: 3,
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let server_addr = env::var("SERVER_ADDR").unwrap_or(defaults.server_addr);
        let static_dir = env::var("STATIC_DIR").unwrap_or(defaults.static_dir);
        let open_browser = parse_var("OPEN_BROWSER", defaults.open_browser)?;

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model = env::var("LLM_CHAT_MODEL").unwrap_or(defaults.llm_chat_model);
        let llm_temperature = parse_var("LLM_TEMPERATURE", defaults.llm_temperature)?;
        if !(0.0..=2.0).contains(&llm_temperature) {
            return Err(anyhow!(
                "LLM_TEMPERATURE debe estar entre 0.0 y 2.0 (recibido {llm_temperature})"
            ));
        }
        let llm_max_output_tokens =
            parse_var("LLM_MAX_OUTPUT_TOKENS", defaults.llm_max_output_tokens)?;

        let max_input_tokens = parse_var("MAX_INPUT_TOKENS", defaults.max_input_tokens)?;
        let cache_ttl_secs = parse_var("CACHE_TTL_SECS", defaults.cache_ttl_secs)?;

        let github_api_url = env::var("GITHUB_API_URL").unwrap_or(defaults.github_api_url);
        let github_max_files = parse_var("GITHUB_MAX_FILES", defaults.github_max_files)?;
        let github_max_total_size =
            parse_var("GITHUB_MAX_TOTAL_SIZE", defaults.github_max_total_size)?;
        let github_max_depth = parse_var("GITHUB_MAX_DEPTH", defaults.github_max_depth)?;

        Ok(Self {
            server_addr,
            static_dir,
            open_browser,
            llm_provider,
            llm_chat_model,
            llm_temperature,
            llm_max_output_tokens,
            max_input_tokens,
            cache_ttl_secs,
            github_api_url,
            github_max_files,
            github_max_total_size,
            github_max_depth,
        })
    }
}

/// Lee una variable numérica/booleana; si no existe se usa el valor por defecto.
fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("Valor inválido para {key} ('{raw}'): {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!(LlmProvider::from_str("OpenAI").unwrap(), LlmProvider::OpenAI);
        assert_eq!(LlmProvider::from_str("ollama").unwrap(), LlmProvider::Ollama);
        assert!(LlmProvider::from_str("anthropic").is_err());
    }

    #[test]
    fn parse_value_reports_the_offending_key() {
        let err = parse_value::<usize>("MAX_INPUT_TOKENS", "mucho").unwrap_err();
        assert!(err.to_string().contains("MAX_INPUT_TOKENS"));
        assert_eq!(parse_value::<u64>("CACHE_TTL_SECS", " 60 ").unwrap(), 60);
        assert!(parse_value::<bool>("OPEN_BROWSER", "true").unwrap());
    }

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.max_input_tokens, 90_000);
        assert_eq!(cfg.github_max_total_size, 512_000);
        assert_eq!(cfg.cache_ttl_secs, 3600);
    }
}
