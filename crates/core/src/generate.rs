//! Text-generation collaborator boundary.
//!
//! The engine assembles a system prompt; something else turns it into the
//! persona's next reply. That something is consumed strictly as a black
//! box behind this trait.

use async_trait::async_trait;

use crate::error::Error;

/// Black-box text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce the persona's next raw response for an assembled prompt.
    /// The caller feeds the returned text back as `previous_response` on
    /// the next turn.
    async fn generate(&self, system_prompt: &str, query: &str) -> Result<String, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, _system_prompt: &str, query: &str) -> Result<String, Error> {
            Ok(format!("echo: {query}"))
        }
    }

    #[tokio::test]
    async fn trait_is_object_safe() {
        let generator: Box<dyn TextGenerator> = Box::new(EchoGenerator);
        let reply = generator.generate("prompt", "hello").await.unwrap();
        assert_eq!(reply, "echo: hello");
    }
}
