//! LLM-written species summaries for the detail view.

use crate::embeddings::{EmbeddingError, OpenAiClient};

pub trait DescriptionEnhancer: Send + Sync {
    /// Summarises the scraped searchable text of one bird.
    fn enhance(&self, searchable_text: &str) -> Result<String, EmbeddingError>;
}

pub struct OpenAiEnhancer {
    client: OpenAiClient,
    model: String,
    max_tokens: u32,
}

impl OpenAiEnhancer {
    pub fn new(client: OpenAiClient, model: &str, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.to_string(),
            max_tokens,
        }
    }
}

pub fn summary_prompt(searchable_text: &str) -> String {
    format!(
        "Extract and format the following bird information from this raw data:\n\n\
         Raw data: {searchable_text}\n\n\
         Provide a summary of the data in 100 words. Don't add unnecessary information other than the bird's details.\n\n\
         Format as a readable paragraph for each section."
    )
}

impl DescriptionEnhancer for OpenAiEnhancer {
    fn enhance(&self, searchable_text: &str) -> Result<String, EmbeddingError> {
        self.client
            .chat(&self.model, &summary_prompt(searchable_text), self.max_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_raw_text() {
        let prompt = summary_prompt("The European robin is a small insectivorous passerine.");
        assert!(prompt.contains("Raw data: The European robin is a small insectivorous passerine."));
        assert!(prompt.contains("100 words"));
    }
}
