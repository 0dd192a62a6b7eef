//! System prompt composition.

use crate::retrieval::RetrievedChunk;

/// Built-in persona used when none is configured.
pub const DEFAULT_PERSONA: &str = "\
You are Encore, a plainspoken and knowledgeable creative advisor. \
Answer specific questions directly; for open-ended requests, offer two or \
three concrete directions to choose from. Start with the core insight and \
offer to go deeper.

Never open with flattery. Never narrate tool usage: discuss the results, \
the interface presents tool outputs automatically. Do not include file paths \
in your text. Keep responses concise.";

const CONTEXT_HEADER: &str = "Here is some relevant reference material from the knowledge base:";
const CONTEXT_FOOTER: &str = "\
Use this context to inform your response when relevant, but don't quote it \
verbatim or mention that you're reading from a knowledge base.";
const SUMMARY_HEADER: &str = "The user shared material that was analyzed. Here is the analysis:";
const SUMMARY_FOOTER: &str = "\
Use this analysis to inform your response and reference its specifics \
when relevant.";

fn block(header: &str, body: &str, footer: &str) -> String {
    format!("{header}\n\n---\n{body}\n---\n\n{footer}")
}

/// Persona, then retrieved context (only when it has visible text), then the
/// one-shot context summary.
pub fn build_system_prompt(
    persona: &str,
    chunks: &[RetrievedChunk],
    context_summary: Option<&str>,
) -> String {
    let mut prompt = persona.to_string();

    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if !context.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&block(CONTEXT_HEADER, &context, CONTEXT_FOOTER));
    }

    if let Some(summary) = context_summary.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(&block(SUMMARY_HEADER, summary, SUMMARY_FOOTER));
    }

    prompt
}
