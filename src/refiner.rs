//! Refinado de diagramas Mermaid con el LLM.
//!
//! El diagrama bruto se envía con una instrucción específica de la notación y
//! se recupera el cuerpo del diagrama de la respuesta (que puede venir rodeada
//! de texto o de bloques de código).

use anyhow::Result;
use tracing::{info, warn};

use crate::diagram::{is_mermaid_code, DiagramKind};
use crate::llm::{GenerationRequest, LlmClient};

const CLASS_DIAGRAM_INSTRUCTION: &str = r#"
You are a code analysis assistant specialized in generating class diagrams. Your task is to analyze the following Mermaid class diagram, identify all relationships between classes (inheritance, composition, aggregation, association, dependency), and then create an improved, more readable version of the diagram.

IMPORTANT: Your response must ONLY contain the improved Mermaid diagram code without any explanations or additional text. Do not include any descriptions before or after the diagram code. Just return the raw Mermaid code that can be directly copied and pasted.
"#;

const SEQUENCE_DIAGRAM_INSTRUCTION: &str = r#"
You are a code analysis assistant that helps analyze code and generates sequence diagrams.
Your task is to improve the given Mermaid sequence diagram by:
- Simulating actors to represent different components or services involved in the interactions.
- Avoiding discrepancies by ensuring the diagram accurately reflects the flow of method calls and data between entities.
- Eliminating any duplicate interactions or redundant information in the diagram.
- Ensuring that the diagram is syntactically correct and follows the latest Mermaid syntax.

IMPORTANT: Your response must ONLY contain the improved Mermaid diagram code without any explanations or additional text. Do not include any descriptions before or after the diagram code. Just return the raw Mermaid code that can be directly copied and pasted.
"#;

/// Parámetros de generación usados en todas las llamadas al LLM.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_output_tokens: u64,
}

impl DiagramKind {
    fn refine_instruction(self) -> &'static str {
        match self {
            Self::Class => CLASS_DIAGRAM_INSTRUCTION,
            Self::Sequence => SEQUENCE_DIAGRAM_INSTRUCTION,
        }
    }
}

/// Construye la petición de refinado con el diagrama en un bloque ```mermaid.
pub fn refine_request(raw: &str, kind: DiagramKind, params: GenerationParams) -> GenerationRequest {
    GenerationRequest {
        prompt: format!("Mermaid code:\n```mermaid\n{}\n```", raw.trim_end()),
        system_instruction: kind.refine_instruction().trim().to_string(),
        temperature: params.temperature,
        max_output_tokens: params.max_output_tokens,
    }
}

/// Pide al LLM una versión mejorada del diagrama.
///
/// Un fallo de la llamada se propaga sin reintentos. Si la respuesta no
/// contiene un diagrama válido de la notación pedida, se devuelve el diagrama
/// original sin refinar.
pub async fn refine(
    llm: &dyn LlmClient,
    raw: &str,
    kind: DiagramKind,
    params: GenerationParams,
) -> Result<String> {
    let request = refine_request(raw, kind, params);
    let response = llm.generate(&request).await?;

    match extract_diagram(&response, kind) {
        Some(refined) => {
            info!("Diagrama {} refinado ({} líneas)", kind.keyword(), refined.lines().count());
            Ok(refined)
        }
        None => {
            warn!(
                "La respuesta del LLM no contiene un {} válido; se devuelve el diagrama sin refinar",
                kind.keyword()
            );
            Ok(raw.to_string())
        }
    }
}

/// Localiza la primera línea que empieza por la palabra clave de la notación y
/// corta en el último cierre de bloque de código posterior, si lo hay. Las
/// menciones de la palabra clave dentro de la prosa no cuentan.
pub fn extract_diagram(response: &str, kind: DiagramKind) -> Option<String> {
    let keyword = kind.keyword();
    let mut offset = 0;
    let start = response.split_inclusive('\n').find_map(|line| {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim_start();
        let rest = trimmed.strip_prefix(keyword)?;
        (rest.is_empty() || rest.starts_with(char::is_whitespace))
            .then(|| line_start + line.len() - trimmed.len())
    })?;
    let body = &response[start..];
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };

    let body = body.trim();
    is_mermaid_code(body).then(|| body.to_string())
}
