//! Strict decoding of structured generation output.

use serde::de::DeserializeOwned;

/// Outcome of decoding a generated JSON array.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Parsed(Vec<T>),
    ParseFailure(String),
}

impl<T> Decoded<T> {
    /// Fall back to an empty list on parse failure, logging the reason.
    pub fn or_empty(self, what: &str) -> Vec<T> {
        match self {
            Decoded::Parsed(items) => items,
            Decoded::ParseFailure(reason) => {
                tracing::warn!("Could not decode generated {}: {}", what, reason);
                Vec::new()
            }
        }
    }
}

/// Decode model output as a JSON array of `T`.
///
/// Models often wrap JSON in a Markdown code fence; a single surrounding
/// fence is stripped before parsing. Anything else that is not a valid array
/// of `T` is a [`Decoded::ParseFailure`].
pub fn decode_items<T: DeserializeOwned>(text: &str) -> Decoded<T> {
    let body = strip_code_fence(text.trim());
    match serde_json::from_str::<Vec<T>>(body) {
        Ok(items) => Decoded::Parsed(items),
        Err(e) => Decoded::ParseFailure(e.to_string()),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening line.
    match rest.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => rest.trim(),
    }
}
