//! Servicio de análisis: encadena guardia de tokens, extracción, proyección,
//! refinado y respuesta a preguntas. Todo se ejecuta secuencialmente dentro de
//! cada petición.

use std::sync::Arc;

use tracing::info;

use crate::answer;
use crate::config::AppConfig;
use crate::diagram::DiagramKind;
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::extractor::SourceModelExtractor;
use crate::llm::LlmClient;
use crate::models::{SkippedFile, SourceInput};
use crate::refiner::{self, GenerationParams};
use crate::token_budget::TokenBudget;

/// Origen del contexto para responder una pregunta.
pub enum ContextSource<'a> {
    /// Contexto estructural ya serializado (p. ej. recuperado de la caché).
    Cached(String),
    Files(&'a [SourceInput]),
}

#[derive(Debug, Clone)]
pub struct GeneratedDiagram {
    pub mermaid_code: String,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct QuestionAnswer {
    pub answer: String,
    /// Contexto usado, para que el llamador lo guarde en caché.
    pub context: String,
}

#[derive(Clone)]
pub struct CodeAnalyzer {
    llm: Arc<dyn LlmClient>,
    extractor: SourceModelExtractor,
    budget: TokenBudget,
    params: GenerationParams,
}

impl CodeAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, cfg: &AppConfig) -> Self {
        Self {
            llm,
            extractor: SourceModelExtractor::default(),
            budget: TokenBudget::new(cfg.max_input_tokens),
            params: GenerationParams {
                temperature: cfg.llm_temperature,
                max_output_tokens: cfg.llm_max_output_tokens,
            },
        }
    }

    /// Extrae → proyecta → refina. El presupuesto se comprueba sobre los
    /// ficheros antes de cualquier trabajo.
    pub async fn generate_diagram(
        &self,
        files: &[SourceInput],
        kind: DiagramKind,
    ) -> AnalyzerResult<GeneratedDiagram> {
        let estimated = self.budget.check_files(files)?;
        info!(
            "Generando {} a partir de {} ficheros (~{} tokens)",
            kind.keyword(),
            files.len(),
            estimated
        );

        let extraction = self.extractor.extract(files);
        let raw = kind.project(&extraction.files);

        let mermaid_code = refiner::refine(self.llm.as_ref(), &raw, kind, self.params)
            .await
            .map_err(|e| AnalyzerError::upstream("No se pudo generar el diagrama", e))?;

        Ok(GeneratedDiagram {
            mermaid_code,
            skipped: extraction.skipped,
        })
    }

    /// Responde una pregunta a partir de un contexto en caché o de ficheros nuevos,
    /// que se reducen primero al modelo estructural en JSON.
    pub async fn answer_question(
        &self,
        question: &str,
        source: ContextSource<'_>,
    ) -> AnalyzerResult<QuestionAnswer> {
        if question.trim().is_empty() {
            return Err(AnalyzerError::bad_request("La pregunta es obligatoria"));
        }

        let context = match source {
            ContextSource::Cached(context) => context,
            ContextSource::Files(files) => {
                let extraction = self.extractor.extract(files);
                info!("Contexto de código extraído de {} ficheros", extraction.files.len());
                answer::structural_context(&extraction.files).map_err(|e| {
                    AnalyzerError::upstream("No se pudo responder a la pregunta sobre el código", e)
                })?
            }
        };

        let estimated = self.budget.check_text(&context)?;
        info!("Tokens estimados: {}", estimated);

        let answer = answer::synthesize(self.llm.as_ref(), question, &context, self.params)
            .await
            .map_err(|e| {
                AnalyzerError::upstream("No se pudo responder a la pregunta sobre el código", e)
            })?;

        Ok(QuestionAnswer { answer, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;

    fn analyzer(llm: Arc<ScriptedLlm>, max_input_tokens: usize) -> CodeAnalyzer {
        let cfg = AppConfig {
            max_input_tokens,
            ..AppConfig::default()
        };
        CodeAnalyzer::new(llm, &cfg)
    }

    #[tokio::test]
    async fn class_diagram_pipeline_sends_projected_blocks_to_the_refiner() {
        let llm = Arc::new(ScriptedLlm::replying([
            "```mermaid\nclassDiagram\n  A <|-- B\n  class A {\n    foo()\n  }\n```",
        ]));
        let files = vec![SourceInput::new(
            "shapes.ts",
            "class A { foo() {} }\nclass B extends A {}\n",
        )];

        let diagram = analyzer(llm.clone(), 90_000)
            .generate_diagram(&files, DiagramKind::Class)
            .await
            .unwrap();

        assert!(diagram.mermaid_code.starts_with("classDiagram"));
        let requests = llm.requests.lock().unwrap();
        let prompt = &requests[0].prompt;
        assert!(prompt.contains("  class A {\n    foo()\n  }"));
        assert!(prompt.contains("  class B {\n  }"));
    }

    #[tokio::test]
    async fn sequence_pipeline_projects_call_edges() {
        let llm = Arc::new(ScriptedLlm::replying(["no diagram here"]));
        let files = vec![SourceInput::new("calls.ts", "function f() { g(); }\nfunction g() {}\n")];

        let diagram = analyzer(llm, 90_000)
            .generate_diagram(&files, DiagramKind::Sequence)
            .await
            .unwrap();

        // Sin palabra clave en la respuesta se devuelve la proyección sin refinar.
        assert_eq!(diagram.mermaid_code, "sequenceDiagram\n  f->>g: Call g\n");
    }

    #[tokio::test]
    async fn budget_is_checked_before_calling_the_llm() {
        let llm = Arc::new(ScriptedLlm::replying(["classDiagram"]));
        let files = vec![SourceInput::new("big.ts", "x".repeat(10_000))];

        let err = analyzer(llm.clone(), 1_000)
            .generate_diagram(&files, DiagramKind::Class)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalyzerError::TokenLimitExceeded { max: 1_000, .. }));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn llm_failures_become_generic_upstream_errors() {
        let llm = Arc::new(ScriptedLlm::failing("connection reset"));
        let files = vec![SourceInput::new("a.ts", "class A {}")];

        let err = analyzer(llm, 90_000)
            .generate_diagram(&files, DiagramKind::Class)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalyzerError::Upstream { .. }));
        assert_eq!(err.to_string(), "No se pudo generar el diagrama");
    }

    #[tokio::test]
    async fn unparseable_files_are_reported_not_fatal() {
        let llm = Arc::new(ScriptedLlm::replying(["classDiagram\n  class A"]));
        let files = vec![
            SourceInput::new("a.ts", "class A {}"),
            SourceInput::new("notes.md", "# README"),
        ];

        let diagram = analyzer(llm, 90_000)
            .generate_diagram(&files, DiagramKind::Class)
            .await
            .unwrap();

        assert_eq!(diagram.skipped.len(), 1);
        assert_eq!(diagram.skipped[0].name, "notes.md");
    }

    #[tokio::test]
    async fn fresh_questions_use_the_structural_context() {
        let llm = Arc::new(ScriptedLlm::replying(["`f` llama a `g`."]));
        let files = vec![SourceInput::new("calls.ts", "function f() { g(); }")];

        let result = analyzer(llm.clone(), 90_000)
            .answer_question("¿Quién llama a g?", ContextSource::Files(&files))
            .await
            .unwrap();

        assert_eq!(result.answer, "`f` llama a `g`.");
        assert!(result.context.contains("\"filePath\": \"/virtual/calls.ts\""));
        assert!(!result.context.contains("function f()"));
        assert!(llm.requests.lock().unwrap()[0].prompt.contains(&result.context));
    }

    #[tokio::test]
    async fn cached_context_skips_extraction_but_not_the_budget() {
        let llm = Arc::new(ScriptedLlm::replying(["respuesta"]));
        let err = analyzer(llm.clone(), 200)
            .answer_question("¿Qué?", ContextSource::Cached("c".repeat(5_000)))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalyzerError::TokenLimitExceeded { .. }));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn empty_questions_are_rejected() {
        let llm = Arc::new(ScriptedLlm::default());
        let err = analyzer(llm, 90_000)
            .answer_question("  ", ContextSource::Cached(String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::BadRequest(_)));
    }
}
