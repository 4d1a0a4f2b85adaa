//! Prompt assembly.

/// Build the single user prompt sent upstream.
///
/// Document text, when present, comes first so the question reads as a
/// follow-up to it.
pub fn build_prompt(question: &str, document: Option<&str>) -> String {
    match document {
        Some(text) => format!(
            "The document content is:\n{}\n\nThe question is: {}",
            text, question
        ),
        None => format!("The question is: {}", question),
    }
}
