use crate::error::{AppError, Result};
use crate::generation::{GenerationConfig, Generator, Prompt};

pub fn sentiment_prompt(review: &str) -> String {
    format!("{}\n\nAnalyze the sentiment of the above review.", review)
}

/// Sentiment analysis of customer reviews
pub struct SentimentApp<G> {
    generator: G,
    generation: GenerationConfig,
}

impl<G: Generator> SentimentApp<G> {
    pub fn new(generator: G) -> Self {
        SentimentApp {
            generator,
            generation: GenerationConfig::analysis(),
        }
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub async fn analyze(&self, review: &str) -> Result<String> {
        let review = review.trim();
        if review.is_empty() {
            return Err(AppError::input("the review is empty"));
        }
        self.generator
            .generate(&Prompt::new(sentiment_prompt(review)), &self.generation)
            .await
    }
}
