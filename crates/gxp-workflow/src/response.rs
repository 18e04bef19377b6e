//! Structured model output
//!
//! Models wrap JSON in prose and markdown fences. Decoding goes through
//! `serde_json`'s streaming deserializer from each candidate start position,
//! so the JSON grammar itself decides where a value ends.

use gxp_core::CollaboratorError;
use serde::de::DeserializeOwned;

/// Decode the first JSON value of type `T` found in `text`
///
/// Text inside the first markdown code fence is preferred when one exists.
///
/// # Errors
/// `CollaboratorError::InvalidResponse` when no candidate decodes as `T`.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, CollaboratorError> {
    if let Some(body) = fenced_body(text) {
        if let Ok(value) = first_value(body) {
            return Ok(value);
        }
    }
    first_value(text)
}

fn first_value<T: DeserializeOwned>(text: &str) -> Result<T, CollaboratorError> {
    let mut last_error = None;
    for (start, _) in text.match_indices(['{', '[']) {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<T>();
        match stream.next() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => last_error = Some(e.to_string()),
            None => {}
        }
    }
    Err(CollaboratorError::InvalidResponse(last_error.map_or_else(
        || "no JSON value in response".to_string(),
        |e| format!("no decodable JSON value in response: {e}"),
    )))
}

fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip the info string, e.g. ```json
    let body_start = after_open.find('\n').map_or(0, |i| i + 1);
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}
