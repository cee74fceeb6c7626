//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};

/// Futuro devuelto por [`LlmClient::generate`]; se usa `Box` para que el trait sea dyn-compatible.
pub type LlmFuture<'a> = BoxFuture<'a, Result<String>>;

/// Petición de generación: prompt de usuario más instrucción de sistema y límites.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: String,
    pub temperature: f64,
    pub max_output_tokens: u64,
}

/// "Llamar a un LLM con un prompt y recibir texto". Los errores del proveedor
/// se devuelven como un fallo opaco con mensaje.
pub trait LlmClient: Send + Sync {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> LlmFuture<'a>;
}

/// Gestor de LLMs basado en Rig.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        if cfg.llm_provider == LlmProvider::OpenAI && std::env::var("OPENAI_API_KEY").is_err() {
            return Err(anyhow!("Falta OPENAI_API_KEY en el entorno"));
        }
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    async fn generate_with_openai(&self, request: &GenerationRequest) -> Result<String> {
        use rig::completion::Prompt;
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(&request.system_instruction)
            .temperature(request.temperature)
            .max_tokens(request.max_output_tokens)
            .build();

        debug!(
            "Llamando a OpenAI ({}) con {} caracteres de prompt",
            model_name,
            request.prompt.len()
        );
        let answer = agent.prompt(request.prompt.as_str()).await?;
        Ok(answer)
    }
}

impl LlmClient for LlmManager {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> LlmFuture<'a> {
        Box::pin(async move {
            match self.provider {
                LlmProvider::OpenAI => self
                    .generate_with_openai(request)
                    .await
                    .map_err(|e| anyhow!("Falló la petición a la API de OpenAI: {e}")),
                ref other => Err(anyhow!(
                    "Proveedor LLM {:?} aún no implementado para chat",
                    other
                )),
            }
        })
    }
}

#[cfg(test)]
pub mod testing {
    //! Cliente LLM en memoria para los tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Devuelve respuestas guionizadas en orden y guarda las peticiones recibidas.
    #[derive(Default)]
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String>>>,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedLlm {
        pub fn replying(replies: impl IntoIterator<Item = &'static str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &'static str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(anyhow!(message))])),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl LlmClient for ScriptedLlm {
        fn generate<'a>(&'a self, request: &'a GenerationRequest) -> LlmFuture<'a> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("sin respuestas guionizadas")));
            Box::pin(async move { reply })
        }
    }
}
