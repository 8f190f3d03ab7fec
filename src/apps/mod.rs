//! Interactive demo applications built on the adapters and pipelines

pub mod analysis;
pub mod faces;
pub mod image_search;
pub mod knowledge_base;
pub mod sentiment;

use crate::error::{AppError, Result};
use log::error;
use std::io::{self, BufRead, Write};

/// Number of neighbours returned by the search apps
pub const DEFAULT_TOP_K: usize = 4;

/// Prompt on stdout and read one line from stdin.
///
/// Returns `None` when the user types `exit` or stdin is closed.
pub fn read_input(label: &str) -> io::Result<Option<String>> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer = String::new();

    print!("\n{}: ", label);
    stdout.flush()?;

    if stdin.lock().read_line(&mut buffer)? == 0 {
        return Ok(None);
    }

    let line = buffer.trim();
    if line.eq_ignore_ascii_case("exit") {
        println!("Goodbye!");
        return Ok(None);
    }
    Ok(Some(line.to_string()))
}

/// User-facing text for a failed interaction
pub fn render_error(err: &AppError) -> String {
    match err {
        AppError::Service { operation, message } => format!(
            "The {} request could not be completed: {}. Check your credentials and network, then try again.",
            operation, message
        ),
        AppError::MalformedResponse { operation, message } => format!(
            "The {} response was not in the expected format: {}",
            operation, message
        ),
        AppError::EmptyIndex { reason } => format!("Nothing is available to search: {}", reason),
        AppError::InvalidConfig { field, message } => {
            format!("Invalid setting `{}`: {}", field, message)
        }
        AppError::InputValidation { message } => format!("Please check your input: {}", message),
        AppError::DimensionMismatch { expected, actual } => format!(
            "The query produced a {}-dimensional vector but the index holds {}-dimensional vectors. \
             Use the same embedding model for indexing and searching.",
            actual, expected
        ),
        AppError::Io { path, source } => {
            format!("Could not read '{}': {}", path.display(), source)
        }
    }
}

/// Print the outcome of one interaction; failures are rendered, not propagated
pub fn report<T>(result: Result<T>, render: impl FnOnce(T)) {
    match result {
        Ok(value) => render(value),
        Err(err) => {
            error!("Interaction failed ({}): {}", err.kind(), err);
            eprintln!("\n{}", render_error(&err));
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::embeddings::{Embedder, Embedding, EmbeddingInput};
    use crate::error::Result;
    use crate::generation::{GenerationConfig, Generator, Prompt};
    use std::cell::{Cell, RefCell};

    /// Bag-of-words embedder over a fixed vocabulary, counting calls
    pub struct VocabularyEmbedder {
        pub vocabulary: Vec<&'static str>,
        pub calls: Cell<usize>,
    }

    impl VocabularyEmbedder {
        pub fn new(vocabulary: &[&'static str]) -> Self {
            VocabularyEmbedder {
                vocabulary: vocabulary.to_vec(),
                calls: Cell::new(0),
            }
        }
    }

    impl Embedder for VocabularyEmbedder {
        async fn embed(&self, input: &EmbeddingInput) -> Result<Embedding> {
            self.calls.set(self.calls.get() + 1);
            let text = input.text.clone().unwrap_or_default().to_lowercase();
            let mut values: Vec<f32> = self
                .vocabulary
                .iter()
                .map(|word| text.matches(word).count() as f32)
                .collect();
            values.push(input.image.as_ref().map_or(0.0, |i| i.len() as f32));
            Ok(Embedding { values })
        }
    }

    /// Records every prompt and answers with a fixed reply
    pub struct RecordingGenerator {
        pub reply: String,
        pub prompts: RefCell<Vec<Prompt>>,
    }

    impl RecordingGenerator {
        pub fn new(reply: &str) -> Self {
            RecordingGenerator {
                reply: reply.to_string(),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl Generator for RecordingGenerator {
        async fn generate(&self, prompt: &Prompt, config: &GenerationConfig) -> Result<String> {
            config.validate()?;
            self.prompts.borrow_mut().push(prompt.clone());
            Ok(self.reply.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_render_error_per_kind() {
        let service = render_error(&AppError::service("embed", "credentials were rejected"));
        assert!(service.contains("embed"));
        assert!(service.contains("credentials"));

        let empty = render_error(&AppError::EmptyIndex {
            reason: "no images found in './images'".to_string(),
        });
        assert!(empty.contains("./images"));

        let config = render_error(&AppError::invalid_config("temperature", "must be between 0 and 1"));
        assert!(config.contains("`temperature`"));

        let mismatch = render_error(&AppError::DimensionMismatch {
            expected: 1536,
            actual: 1024,
        });
        assert!(mismatch.contains("1024"));
        assert!(mismatch.contains("1536"));

        let io = render_error(&AppError::io(
            PathBuf::from("logs.json"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        ));
        assert!(io.contains("logs.json"));
    }
}
