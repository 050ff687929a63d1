//! Prompt assembly for question answering.
//!
//! Every retrieved chunk is "stuffed" into a single prompt, separated by blank lines, followed
//! by the question itself.

use crate::index::ScoredChunk;

/// Template with `{context}` and `{question}` placeholders.
pub(crate) const QA_TEMPLATE: &str =
    "You are a helpful assistant. Greet the user before answering.\n\n{context}\n{question}";

/// Render [`QA_TEMPLATE`] for the retrieved chunks and question.
pub(crate) fn render_prompt(chunks: &[ScoredChunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    fill_template(QA_TEMPLATE, |name| match name {
        "context" => Some(context.as_str()),
        "question" => Some(question),
        _ => None,
    })
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Values are inserted verbatim and never rescanned, so braces inside document text or the
/// question cannot trigger further substitution. Unknown placeholders are kept as-is.
fn fill_template<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match lookup(name) {
                    Some(value) => rendered.push_str(value),
                    None => {
                        rendered.push('{');
                        rendered.push_str(name);
                        rendered.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                rendered.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    rendered.push_str(rest);
    rendered
}
