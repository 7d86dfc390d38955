//! Context assembly
//!
//! Turns retrieved documents into the context block handed to the model.

use consulta_core::Document;

/// Separator placed between consecutive document bodies
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Join document contents in store order.
///
/// No filtering, truncation or deduplication happens here; an empty slice
/// yields an empty string.
pub fn assemble_context(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_documents_give_empty_context() {
        assert_eq!(assemble_context(&[]), "");
    }

    #[test]
    fn test_single_document_has_no_separator() {
        let docs = vec![Document::new(1, "only", 0.9)];
        assert_eq!(assemble_context(&docs), "only");
    }

    #[test]
    fn test_order_is_preserved() {
        let docs = vec![
            Document::new(1, "doc-A", 0.9),
            Document::new(2, "doc-B", 0.8),
        ];
        assert_eq!(assemble_context(&docs), "doc-A\n---\ndoc-B");
    }

    #[test]
    fn test_duplicates_and_empty_bodies_are_kept() {
        let docs = vec![
            Document::new(1, "same", 0.9),
            Document::new(2, "", 0.8),
            Document::new(3, "same", 0.7),
        ];
        assert_eq!(assemble_context(&docs), "same\n---\n\n---\nsame");
    }

    proptest! {
        #[test]
        fn prop_context_matches_join(contents in prop::collection::vec(".*", 0..6)) {
            let docs: Vec<Document> = contents
                .iter()
                .enumerate()
                .map(|(i, c)| Document::new(i as i64, c.clone(), 0.5))
                .collect();

            prop_assert_eq!(assemble_context(&docs), contents.join("\n---\n"));
        }
    }
}
