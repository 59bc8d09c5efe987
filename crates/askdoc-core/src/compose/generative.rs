//! Prompt construction and output cleanup for generated answers.

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("invalid sentence regex"));

static BLANK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").expect("invalid blank line regex"));

// A conjunction that starts a new question: "... and where is ...".
static JOINED_QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\s,]+(?:and|also)\s+((?:what|how|when|where|why|who|which)\b)")
        .expect("invalid sub-question regex")
});

/// Split a message into independent questions.
///
/// Splits on `?` and `;`, and before "and"/"also" when followed by an
/// interrogative word. Returns the trimmed non-empty parts; a message with
/// no separators yields itself.
pub fn split_questions(message: &str) -> Vec<String> {
    let mut questions = Vec::new();
    for part in message.split(['?', ';']) {
        let mut start = 0;
        for caps in JOINED_QUESTION.captures_iter(part) {
            let (whole, word) = match (caps.get(0), caps.get(1)) {
                (Some(w), Some(q)) => (w, q),
                _ => continue,
            };
            push_trimmed(&mut questions, &part[start..whole.start()]);
            start = word.start();
        }
        push_trimmed(&mut questions, &part[start..]);
    }
    questions
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

/// Instruction sent to the generation provider.
pub fn build_prompt(organization: &str, context: &str, question: &str, max_sentences: usize) -> String {
    format!(
        "You are a helpful assistant answering questions about {org}.\n\
         Answer the question using only the context below, in at most {n} sentences.\n\
         If the context does not contain the answer, say that you don't know.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:",
        org = organization,
        n = max_sentences,
        context = context.trim(),
        question = question.trim(),
    )
}

/// Collapse runs of blank lines and keep the first `max_sentences` sentences.
pub fn postprocess(raw: &str, max_sentences: usize) -> String {
    let collapsed = BLANK_RUN.replace_all(raw.trim(), "\n\n");
    let text = collapsed.trim();

    match SENTENCE_END.find_iter(text).nth(max_sentences.max(1) - 1) {
        Some(end) => text[..end.end()].trim_end().to_string(),
        None => text.to_string(),
    }
}
