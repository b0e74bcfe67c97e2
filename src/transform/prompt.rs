//! prompt.rs
//!
//! Turns retrieved documents and a question into a grounded instruction
//! prompt. Pure string formatting.

use std::path::Path;

use crate::client::chroma_client::QueryMatch;

/// What the model must say when the context does not cover the question.
pub const NOT_IN_CONTEXT: &str = "This information is not in the provided context";

/// Numbered context block, one entry per match, closest first:
///
/// ```text
/// Document 1 (Source: notes.md):
/// <text>
///
/// ```
pub fn build_context(matches: &[QueryMatch]) -> String {
    let mut context = String::new();
    for (i, m) in matches.iter().enumerate() {
        let source = m
            .source_path()
            .and_then(|p| Path::new(p).file_name())
            .map(|name| format!(" (Source: {})", name.to_string_lossy()))
            .unwrap_or_default();
        context.push_str(&format!(
            "Document {}{}:\n{}\n\n",
            i + 1,
            source,
            m.document
        ));
    }
    context
}

/// Restricts the model to `context`, demands quoted evidence, and carries a
/// reasoning scaffold the answer should not repeat.
pub fn structured_prompt(context: &str, question: &str) -> String {
    format!(
        r#"You are a specialized assistant that MUST follow these rules:
1. ONLY use information from the provided context
2. Do NOT use any external knowledge
3. If information isn't in the context, say "{NOT_IN_CONTEXT}"
4. Support your answer with direct quotes using "..." from the context

Context:
{context}

Question: {question}

You are to use the below steps but don't need to include them in your response, just provide the answer:

Step 1: First state whether the context contains enough information to answer the question.
Step 2: If yes, provide the answer with direct quotes as evidence.
Step 3: If no, explicitly state what information is missing."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::record::Metadata;

    fn hit(doc: &str, path: Option<&str>) -> QueryMatch {
        QueryMatch {
            id: "x".into(),
            document: doc.into(),
            metadata: path.map(|p| {
                let mut m = Metadata::new();
                m.insert("path".into(), p.into());
                m
            }),
            distance: None,
        }
    }

    #[test]
    fn context_numbers_documents_and_names_sources() {
        let ctx = build_context(&[
            hit("Hello world", Some("/kb/notes/hello.md")),
            hit("No metadata here", None),
        ]);
        assert_eq!(
            ctx,
            "Document 1 (Source: hello.md):\nHello world\n\nDocument 2:\nNo metadata here\n\n"
        );
    }

    #[test]
    fn non_string_path_is_ignored() {
        let mut m = Metadata::new();
        m.insert("path".into(), 42.into());
        let ctx = build_context(&[QueryMatch {
            id: "x".into(),
            document: "doc".into(),
            metadata: Some(m),
            distance: None,
        }]);
        assert_eq!(ctx, "Document 1:\ndoc\n\n");
    }

    #[test]
    fn empty_context_is_empty() {
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn prompt_embeds_rules_context_and_question() {
        let prompt = structured_prompt("Document 1:\nThe sky is green.\n\n", "What colour is the sky?");

        assert!(prompt.starts_with("You are a specialized assistant"));
        assert!(prompt.contains("ONLY use information from the provided context"));
        assert!(prompt.contains("Do NOT use any external knowledge"));
        assert!(prompt.contains(&format!("say \"{NOT_IN_CONTEXT}\"")));
        assert!(prompt.contains("direct quotes"));
        assert!(prompt.contains("Context:\nDocument 1:\nThe sky is green."));
        assert!(prompt.contains("Question: What colour is the sky?"));
        assert!(prompt.contains("don't need to include them in your response"));
        assert!(prompt.ends_with("explicitly state what information is missing."));
        assert_eq!(prompt, structured_prompt("Document 1:\nThe sky is green.\n\n", "What colour is the sky?"));
    }
}
