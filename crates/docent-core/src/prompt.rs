//! Prompt templates: the fixed system instructions and the per-question user prompt.

use crate::store::DocumentSection;

/// Sections retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant from the JSAR open-source project, \
which is a new Web browser engine for spatial computing.\n \
As an assistant, you can help users to learn something from the JSAR website and documentation(including translation), \
write Web apps to be used in JSAR, answer questions related to the JSAR project, \
and you must write the response in the following guidance: \
respond to the user's question in the language of the question, \
use a white space between english and chinese characters\n\n";

/// Builds the prompt sent in place of the user's raw question: instructions, the question,
/// retrieved sections, and the text of the page being read.
pub fn assemble_prompt<'a>(
    query: &str,
    sections: impl IntoIterator<Item = &'a DocumentSection>,
    page_text: &str,
) -> String {
    let mut parts: Vec<String> = vec![
        "Please use the context below and chat history to answer the question.".into(),
        "You must answer the question in the language of the question, and if you don't know the answer, please say \"I don't know\".\n\n".into(),
        format!("Question: {query}\n"),
        "Context:\n".into(),
        "...\n".into(),
    ];
    parts.extend(
        sections
            .into_iter()
            .map(|s| format!("Title: {}\nText: {}", s.title, s.text)),
    );
    parts.push("...\n".into());
    parts.push(format!("Current reading content: {page_text}\n"));
    parts.push("If the provided context or chat history is not enough to let you answer the question,".into());
    parts.push("please answer there is no content available in the document, and you don't know the answer.".into());
    parts.join(" ")
}
