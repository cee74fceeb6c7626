//! Respuesta a preguntas libres sobre el código a partir del contexto estructural.

use anyhow::{Context, Result};

use crate::llm::{GenerationRequest, LlmClient};
use crate::models::SourceFile;
use crate::refiner::GenerationParams;

const SYSTEM_PROMPT: &str = "You are a code analysis assistant that helps analyze code and generates diagrams or explanations based on the code provided.";

/// Serializa el modelo estructural (clases, interfaces y funciones por fichero)
/// como JSON; es el contexto que se envía al LLM en lugar del código bruto.
pub fn structural_context(files: &[SourceFile]) -> Result<String> {
    serde_json::to_string_pretty(files).context("No se pudo serializar el contexto estructural")
}

pub fn question_prompt(question: &str, context: &str) -> String {
    format!(
        "I have some code files from a repository that I'd like you to analyze and answer a question about. The context includes functions, classes, interfaces, and their relationships.\n\n\
Question: {question}\n\n\
Please provide a detailed and helpful answer based on the code. If the question is unclear or cannot be answered based on the provided code, explain why and what additional information would be needed.\n\n\
Here are the code files:\n\n\
{context}"
    )
}

/// Devuelve el texto bruto del LLM (Markdown). El presupuesto de tokens se
/// comprueba antes, en el servicio.
pub async fn synthesize(
    llm: &dyn LlmClient,
    question: &str,
    context: &str,
    params: GenerationParams,
) -> Result<String> {
    let request = GenerationRequest {
        prompt: question_prompt(question, context),
        system_instruction: SYSTEM_PROMPT.to_string(),
        temperature: params.temperature,
        max_output_tokens: params.max_output_tokens,
    };
    llm.generate(&request).await
}
