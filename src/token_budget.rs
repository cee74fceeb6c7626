//! Estimación conservadora de tokens antes de llamar al LLM.
//!
//! No es un tokenizador: aplica una proporción fija sobre el número de
//! caracteres (nombres + contenidos + una sobrecarga fija de prompt).

use tracing::{debug, warn};

use crate::error::{AnalyzerError, AnalyzerResult};
use crate::models::SourceInput;

/// Aproximadamente 4 caracteres por token.
pub const TOKENS_PER_CHAR: f64 = 0.25;
/// Caracteres reservados para las instrucciones del prompt.
pub const PROMPT_OVERHEAD_CHARS: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    pub max_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Caracteres de un lote de ficheros, sin la sobrecarga del prompt.
    pub fn batch_chars(files: &[SourceInput]) -> usize {
        files
            .iter()
            .map(|file| file.name.chars().count() + file.content.chars().count())
            .sum()
    }

    pub fn estimate_files(files: &[SourceInput]) -> usize {
        chars_to_tokens(Self::batch_chars(files) + PROMPT_OVERHEAD_CHARS)
    }

    pub fn estimate_text(text: &str) -> usize {
        chars_to_tokens(text.chars().count() + PROMPT_OVERHEAD_CHARS)
    }

    pub fn check_files(&self, files: &[SourceInput]) -> AnalyzerResult<usize> {
        self.check(Self::estimate_files(files))
    }

    pub fn check_text(&self, text: &str) -> AnalyzerResult<usize> {
        self.check(Self::estimate_text(text))
    }

    fn check(&self, estimated: usize) -> AnalyzerResult<usize> {
        if estimated > self.max_tokens {
            warn!(
                "Presupuesto de tokens superado: estimados {} > máximo {}",
                estimated, self.max_tokens
            );
            return Err(AnalyzerError::TokenLimitExceeded {
                estimated,
                max: self.max_tokens,
            });
        }
        debug!("Tokens estimados: {} (máximo {})", estimated, self.max_tokens);
        Ok(estimated)
    }
}

fn chars_to_tokens(chars: usize) -> usize {
    (chars as f64 * TOKENS_PER_CHAR).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(sizes: &[usize]) -> Vec<SourceInput> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| SourceInput::new(format!("f{i}.ts"), "x".repeat(*size)))
            .collect()
    }

    #[test]
    fn estimate_counts_names_contents_and_overhead() {
        // "a.ts" (4) + 96 caracteres + 500 de sobrecarga = 600 → 150 tokens
        let files = vec![SourceInput::new("a.ts", "y".repeat(96))];
        assert_eq!(TokenBudget::estimate_files(&files), 150);
        assert_eq!(TokenBudget::estimate_text(""), 125);
        assert_eq!(TokenBudget::estimate_text("abc"), 126);
    }

    #[test]
    fn estimate_is_monotonic_and_shares_one_overhead() {
        let a = batch(&[120, 33]);
        let b = batch(&[999]);
        let both: Vec<_> = a.iter().chain(b.iter()).cloned().collect();

        let est_a = TokenBudget::estimate_files(&a);
        let est_b = TokenBudget::estimate_files(&b);
        let est_both = TokenBudget::estimate_files(&both);
        assert!(est_both >= est_a && est_both >= est_b);

        let overhead = chars_to_tokens(PROMPT_OVERHEAD_CHARS);
        let summed = est_a + est_b - overhead;
        assert!(est_both.abs_diff(summed) <= 1, "{est_both} vs {summed}");
    }

    #[test]
    fn rejection_carries_estimate_and_ceiling() {
        let budget = TokenBudget::new(200);
        let files = batch(&[2_000]);

        match budget.check_files(&files) {
            Err(AnalyzerError::TokenLimitExceeded { estimated, max }) => {
                assert_eq!(estimated, TokenBudget::estimate_files(&files));
                assert_eq!(max, 200);
            }
            other => panic!("expected TokenLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn accepts_batches_at_the_ceiling() {
        let files = vec![SourceInput::new("a.ts", "y".repeat(96))];
        assert_eq!(TokenBudget::new(150).check_files(&files).unwrap(), 150);
        assert!(TokenBudget::new(149).check_text(&"z".repeat(92)).is_ok());
    }
}
