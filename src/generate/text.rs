//! Text helpers shared by the generators: chunking, prompt rendering and
//! recovering JSON from free-form model output.

use crate::models::QaPair;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Split text into chunks of at most `chunk_size` characters on paragraph
/// boundaries. A paragraph longer than `chunk_size` becomes its own chunk.
///
/// Each new chunk starts with the tail of the previous one (at most
/// `overlap` characters, snapped to a sentence start when possible).
pub fn split_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        let current_len = current.chars().count();
        if current_len > 0 && current_len + para.chars().count() > chunk_size {
            let carry = overlap_tail(&current, overlap).to_string();
            chunks.push(std::mem::take(&mut current));
            if !carry.is_empty() {
                current = carry;
                current.push_str("\n\n");
            }
            current.push_str(para);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

fn overlap_tail(chunk: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    let start = chunk
        .char_indices()
        .rev()
        .nth(overlap - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &chunk[start..];

    match tail.find(". ") {
        Some(pos) if pos + 2 < tail.len() => tail[pos + 2..].trim_start(),
        _ => tail.trim_start(),
    }
}

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("static placeholder pattern"));

/// Fill `{name}` placeholders in one pass; unknown placeholders are kept.
///
/// Substituted values are never re-scanned, so document text containing
/// braces is inserted verbatim.
pub fn render_prompt(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            vars.iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("static fence pattern")
});

/// Recover a JSON value from model output.
///
/// Tries, in order: the whole text, a fenced code block, and the widest
/// bracketed span (arrays before objects).
pub fn extract_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    for caps in FENCE_RE.captures_iter(text) {
        if let Ok(value) = serde_json::from_str(&caps[1]) {
            return Some(value);
        }
    }

    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

static QA_FALLBACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"question"\s*:\s*"((?:[^"\\]|\\.)*)"\s*,\s*"answer"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("static qa pattern")
});

fn unescape_json_string(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

/// Question-answer pairs from a model response.
///
/// Accepts a JSON array, an object holding `qa_pairs`, or (as a last
/// resort) `"question": ..., "answer": ...` fragments in malformed output.
pub fn parse_qa_pairs(text: &str) -> Vec<QaPair> {
    let items = match extract_json_from_text(text) {
        Some(Value::Array(items)) => Some(items),
        Some(Value::Object(mut obj)) => match obj.remove("qa_pairs") {
            Some(Value::Array(items)) => Some(items),
            _ => Some(vec![Value::Object(obj)]),
        },
        _ => None,
    };

    let pairs: Vec<QaPair> = items
        .unwrap_or_default()
        .iter()
        .filter_map(|item| {
            let question = item.get("question")?.as_str()?.trim();
            let answer = item.get("answer")?.as_str()?.trim();
            (!question.is_empty() && !answer.is_empty()).then(|| QaPair::new(question, answer))
        })
        .collect();

    if !pairs.is_empty() {
        return pairs;
    }

    QA_FALLBACK_RE
        .captures_iter(text)
        .map(|caps| QaPair::new(unescape_json_string(&caps[1]), unescape_json_string(&caps[2])))
        .collect()
}

/// First `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// File stem of an input path, used to derive output names.
pub fn file_stem(input: &str) -> String {
    std::path::Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_into_chunks_packs_paragraphs() {
        let paragraphs = [
            "Paragraph one.".repeat(5),
            "Paragraph two.".repeat(5),
            "Paragraph three.".repeat(5),
        ];
        let text = paragraphs.join("\n\n");

        let chunks = split_into_chunks(&text, 50, 10);
        assert!(chunks.len() >= 2);
        let combined: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(combined >= text.len());
        assert!(chunks[0].starts_with("Paragraph one."));
    }

    #[test]
    fn test_split_small_text_is_one_chunk() {
        let chunks = split_into_chunks("Short.\n\nAlso short.", 4000, 200);
        assert_eq!(chunks, vec!["Short.\n\nAlso short.".to_string()]);
        assert!(split_into_chunks("  \n\n ", 100, 10).is_empty());
    }

    #[test]
    fn test_overlap_snaps_to_sentence() {
        let first = "Alpha beta. Gamma delta. Epsilon zeta.";
        let text = format!("{first}\n\nNext paragraph.");
        let chunks = split_into_chunks(&text, 40, 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "Epsilon zeta.\n\nNext paragraph.");

        let chunks = split_into_chunks(&text, 40, 0);
        assert_eq!(chunks[1], "Next paragraph.");
    }

    #[test]
    fn test_render_prompt() {
        let rendered = render_prompt(
            "Make {num_pairs} pairs.\nSummary: {summary}\n{text}\n{unknown}",
            &[("num_pairs", "3"), ("summary", "S"), ("text", "literal {summary}")],
        );
        assert_eq!(rendered, "Make 3 pairs.\nSummary: S\nliteral {summary}\n{unknown}");
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let text = r#"
    Some random text before the JSON
    ```json
    [
        {"question": "What is synthetic data?", "answer": "Artificial data."},
        {"question": "Why use it?", "answer": "Privacy."}
    ]
    ```
    Some random text after the JSON
    "#;
        let value = extract_json_from_text(text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["question"], "What is synthetic data?");
    }

    #[test]
    fn test_extract_json_from_embedded_object() {
        let text = "Here you go: {\"question\": \"Q\", \"answer\": \"A\"} hope it helps";
        let value = extract_json_from_text(text).unwrap();
        assert_eq!(value["answer"], "A");
        assert!(extract_json_from_text("no json here").is_none());
    }

    #[test]
    fn test_parse_qa_pairs() {
        let pairs = parse_qa_pairs(r#"[{"question": "Q1?", "answer": "A1."}, {"question": "", "answer": "skip"}]"#);
        assert_eq!(pairs, vec![QaPair::new("Q1?", "A1.")]);

        let wrapped = parse_qa_pairs(r#"{"qa_pairs": [{"question": "Q2?", "answer": "A2."}]}"#);
        assert_eq!(wrapped, vec![QaPair::new("Q2?", "A2.")]);

        // Trailing comma breaks JSON; the fragments are still recovered.
        let broken = r#"[{"question": "Q3 \"quoted\"?", "answer": "A3."},]"#;
        assert_eq!(
            parse_qa_pairs(broken),
            vec![QaPair::new("Q3 \"quoted\"?", "A3.")]
        );

        assert!(parse_qa_pairs("I cannot help with that.").is_empty());
    }

    #[test]
    fn test_truncate_and_stem() {
        assert_eq!(truncate_chars("héllo world", 5), "héllo");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(file_stem("data/parsed/report.txt"), "report");
        assert_eq!(file_stem("x/doc_cleaned.json"), "doc_cleaned");
    }
}
