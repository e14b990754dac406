//! Extracting a move from an LLM reply.
//!
//! Models are asked for `{"reasoning": "...", "value": ...}` but do not
//! always comply. The reply is tried, in order, as:
//! 1. plain JSON,
//! 2. JSON inside a fenced code block,
//! 3. either of the above with trailing commas removed,
//! 4. a bare decision on the first non-empty line (`STAY`, `JOIN Group A`, `7`).
//!
//! Whatever comes out is only a proposal; the game decides whether it is
//! legal.

use altruism_core::decision::Proposal;
use altruism_types::MoveValue;
use serde::Deserialize;

use crate::error::RunnerError;

/// The JSON shape models are asked to answer with.
#[derive(Debug, Deserialize)]
struct RawAnswer {
    #[serde(default)]
    reasoning: String,
    #[serde(alias = "decision", alias = "action", alias = "answer")]
    value: MoveValue,
}

impl From<RawAnswer> for Proposal {
    fn from(raw: RawAnswer) -> Self {
        Self {
            value: raw.value,
            rationale: raw.reasoning,
        }
    }
}

/// Parse a reply into a [`Proposal`].
///
/// # Errors
///
/// Returns [`RunnerError::Parse`] for an empty reply, or for one that looks
/// like JSON but has no usable `value`.
pub fn parse_reply(raw: &str) -> Result<Proposal, RunnerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RunnerError::Parse("empty reply".to_owned()));
    }

    let fenced = extract_codeblock(trimmed);
    let candidates = [Some(trimmed), fenced];
    for text in candidates.iter().flatten() {
        if let Ok(answer) = serde_json::from_str::<RawAnswer>(text) {
            return Ok(answer.into());
        }
        if let Ok(answer) = serde_json::from_str::<RawAnswer>(&strip_trailing_commas(text)) {
            return Ok(answer.into());
        }
    }

    if trimmed.starts_with('{') || fenced.is_some() {
        return Err(RunnerError::Parse(format!("no usable value in: {trimmed}")));
    }

    bare_decision(trimmed)
        .ok_or_else(|| RunnerError::Parse(format!("no decision in: {trimmed}")))
}

/// First non-empty line as the move, the rest as the rationale.
fn bare_decision(text: &str) -> Option<Proposal> {
    let mut lines = text.lines().map(str::trim).skip_while(|l| l.is_empty());
    let first = lines.next()?;
    let value = first.trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.');
    if value.is_empty() {
        return None;
    }
    let rest: Vec<&str> = lines.filter(|l| !l.is_empty()).collect();

    let value = value
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map_or_else(|| MoveValue::from(value), MoveValue::Number);
    Some(Proposal::new(value, rest.join(" ")))
}

/// Body of the first fenced code block, with or without a language tag.
fn extract_codeblock(text: &str) -> Option<&str> {
    let (_, after_open) = text.split_once("```")?;
    let (_, body) = after_open.split_once('\n')?;
    let (inner, _) = body.split_once("```")?;
    Some(inner.trim())
}

/// Remove commas that directly precede a closing brace or bracket, outside
/// string literals.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => {
                let mut pending = String::new();
                while let Some(&ws) = chars.peek().filter(|n| n.is_whitespace()) {
                    pending.push(ws);
                    chars.next();
                }
                if !matches!(chars.peek(), Some('}' | ']')) {
                    out.push(',');
                }
                out.push_str(&pending);
                continue;
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let p = parse_reply(r#"{"reasoning": "my friends are here", "value": "STAY"}"#).unwrap();
        assert_eq!(p.value, MoveValue::from("STAY"));
        assert_eq!(p.rationale, "my friends are here");
    }

    #[test]
    fn parses_numeric_value() {
        let p = parse_reply(r#"{"reasoning": "leave some for others", "value": 4}"#).unwrap();
        assert_eq!(p.value, MoveValue::Number(4.0));
    }

    #[test]
    fn accepts_value_aliases() {
        let p = parse_reply(r#"{"decision": "JOIN Group B"}"#).unwrap();
        assert_eq!(p.value, MoveValue::from("JOIN Group B"));
        assert!(p.rationale.is_empty());
    }

    #[test]
    fn parses_from_codeblock() {
        let raw = "Here is my answer:\n\n```json\n{\"reasoning\": \"fair\", \"value\": 50}\n```\nThanks.";
        assert_eq!(parse_reply(raw).unwrap().value, MoveValue::Number(50.0));
    }

    #[test]
    fn parses_with_trailing_comma() {
        let p = parse_reply(r#"{"reasoning": "tired", "value": 2,}"#).unwrap();
        assert_eq!(p.value, MoveValue::Number(2.0));
    }

    #[test]
    fn falls_back_to_first_line() {
        let p = parse_reply("\nLEAVE\nBob is in my group and I would rather be alone.").unwrap();
        assert_eq!(p.value, MoveValue::from("LEAVE"));
        assert_eq!(p.rationale, "Bob is in my group and I would rather be alone.");

        let p = parse_reply("7.").unwrap();
        assert_eq!(p.value, MoveValue::Number(7.0));
    }

    #[test]
    fn json_without_value_is_an_error() {
        assert!(parse_reply(r#"{"reasoning": "hmm"}"#).is_err());
        assert!(parse_reply("```json\n{\"value\": null}\n```").is_err());
    }

    #[test]
    fn empty_reply_is_an_error() {
        assert!(matches!(parse_reply("   \n "), Err(RunnerError::Parse(_))));
    }

    #[test]
    fn extract_json_from_plain_codeblock() {
        assert_eq!(
            extract_codeblock("```\n{\"key\": \"value\"}\n```"),
            Some("{\"key\": \"value\"}")
        );
    }

    #[test]
    fn strip_trailing_commas_objects_and_arrays() {
        assert_eq!(strip_trailing_commas(r#"{"a": 1, "b": 2,}"#), r#"{"a": 1, "b": 2}"#);
        assert_eq!(strip_trailing_commas("[1, 2, 3,\n]"), "[1, 2, 3\n]");
    }

    #[test]
    fn strip_trailing_commas_leaves_strings_alone() {
        let input = r#"{"reasoning": "first, }", "value": 1,}"#;
        assert_eq!(
            strip_trailing_commas(input),
            r#"{"reasoning": "first, }", "value": 1}"#
        );
    }
}
