use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn brace_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Greedy, dot matches newline: from the first `{` to the last `}`.
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

fn non_alnum_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

/// Pull a JSON object out of free-form model output.
///
/// The whole trimmed text is tried first; then every brace-delimited block
/// found in the text, in order. The first candidate that parses as an object
/// wins. Models routinely wrap their JSON in prose or fences, so the fallback
/// scan is load-bearing.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    let mut candidates = vec![trimmed];
    candidates.extend(brace_block().find_iter(text).map(|m| m.as_str()));

    candidates
        .into_iter()
        .filter(|c| !c.is_empty())
        .find_map(|c| match serde_json::from_str::<Value>(c) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
}

/// Normalize a topic key: lowercase, runs of non-alphanumerics collapsed to a
/// single hyphen, no leading or trailing hyphens.
pub fn normalize_topic(topic: &str) -> String {
    let lowered = topic.trim().to_lowercase();
    non_alnum_run()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// A generated opener that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPayload {
    pub topic_key: String,
    pub message: String,
}

/// Why a model response was rejected for a retry round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoJson,
    EmptyTopic,
    EmptyMessage,
    DuplicateTopic(String),
}

/// Validate one raw response against the topics already used today.
pub fn parse_topic_payload(
    raw: &str,
    used_topics: &std::collections::BTreeSet<String>,
) -> Result<TopicPayload, Rejection> {
    let obj = extract_json_object(raw).ok_or(Rejection::NoJson)?;

    let topic_key = normalize_topic(&field_text(obj.get("topic_key")));
    let message = field_text(obj.get("message")).trim().to_string();

    if topic_key.is_empty() {
        return Err(Rejection::EmptyTopic);
    }
    if message.is_empty() {
        return Err(Rejection::EmptyMessage);
    }
    if used_topics.contains(&topic_key) {
        return Err(Rejection::DuplicateTopic(topic_key));
    }
    Ok(TopicPayload { topic_key, message })
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
