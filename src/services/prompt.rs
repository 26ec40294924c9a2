use crate::database::RetrievedDocument;
use crate::models::ChatMessage;

/// Strip template-placeholder braces from document content. Applied before
/// formatting so retrieved text can never collide with prompt templating
/// downstream. Idempotent.
pub fn sanitize_content(content: &str) -> String {
    content.chars().filter(|c| !matches!(c, '{' | '}')).collect()
}

/// One line per retrieved document, numbering from 1, ordering preserved.
fn document_line(index: usize, doc: &RetrievedDocument) -> String {
    format!(
        "Document {}: Titled '{}' on page {}, it says: \"{}\".",
        index + 1,
        doc.source,
        doc.page,
        sanitize_content(&doc.content)
    )
}

/// Deterministic prompt assembly: prior summary verbatim, the fixed persona
/// block, one line per document in retrieval order, then a human turn
/// embedding the literal question.
pub fn build_messages(
    summary: &str,
    persona: &str,
    documents: &[RetrievedDocument],
    question: &str,
) -> Vec<ChatMessage> {
    let document_block = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| document_line(i, doc))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "Previous conversation:\n{}\n{}\n{}",
        summary, persona, document_block
    );

    let human = format!(
        "Based on the documents provided, please give an answer to the following question: {}",
        question
    );

    vec![ChatMessage::system(system), ChatMessage::user(human)]
}
