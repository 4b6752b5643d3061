//! Default prompt templates for AI interactions

/// Default system prompt for the AI assistant
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Be concise and helpful.";

/// System prompt suggested when thinking mode is enabled
pub const DEFAULT_REASONING_PROMPT: &str =
    "You are a helpful AI assistant. Think carefully before answering and show your reasoning process.";

/// Composes a question with RAG context the way the backend does when a
/// `context` field accompanies the message. Wording must match the
/// server-side template byte for byte.
pub fn contextual_question(context: &str, question: &str) -> String {
    format!(
        "Context information:\n{}\n\nQuestion: {}\n\nPlease answer the question based on the provided context.",
        context, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn contextual_question_matches_backend_template() {
        let composed = contextual_question("Paris is in France.", "Where is Paris?");
        assert_eq!(
            composed,
            "Context information:\nParis is in France.\n\nQuestion: Where is Paris?\n\nPlease answer the question based on the provided context."
        );
    }
}
