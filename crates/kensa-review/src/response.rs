//! Decoding engine output into review items.

use kensa_core::{FileReview, KensaError, LineRef, PromptVariant, ReviewItem};
use serde_json::Value;
use tracing::{debug, warn};

/// Decode a structured engine response into review items.
///
/// Optional Markdown code fences around the JSON are stripped. Entries that
/// are not objects, or that carry no comment, are dropped.
///
/// # Errors
///
/// Returns [`KensaError::Decode`] if the text is not JSON, or is not an object
/// with a `reviews` array.
///
/// # Examples
///
/// ```
/// use kensa_core::LineRef;
/// use kensa_review::response::decode_reviews;
///
/// let raw = r#"{"reviews":[{"lineNumber":"10","reviewTitle":"[Warning] Debug output","reviewComment":"Remove console.log.","improveDiff":""}]}"#;
/// let items = decode_reviews(raw).unwrap();
/// assert_eq!(items[0].line, LineRef::Line(10));
/// assert_eq!(items[0].suggested_patch, None);
///
/// assert!(decode_reviews("not json").is_err());
/// ```
pub fn decode_reviews(raw: &str) -> Result<Vec<ReviewItem>, KensaError> {
    let cleaned = strip_code_fences(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| KensaError::Decode(format!("response is not JSON: {e}")))?;

    let reviews = value
        .get("reviews")
        .ok_or_else(|| KensaError::Decode("response has no `reviews` field".into()))?
        .as_array()
        .ok_or_else(|| KensaError::Decode("`reviews` is not an array".into()))?;

    let mut items = Vec::with_capacity(reviews.len());
    for (idx, entry) in reviews.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            debug!(idx, "skipping non-object review entry");
            continue;
        };

        let comment = obj
            .get("reviewComment")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if comment.is_empty() {
            debug!(idx, "skipping review entry without comment");
            continue;
        }

        let title = obj
            .get("reviewTitle")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();

        let suggested_patch = obj
            .get("improveDiff")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim_end().to_string());

        items.push(ReviewItem {
            line: line_ref(obj.get("lineNumber")),
            title: title.to_string(),
            comment: comment.to_string(),
            suggested_patch,
        });
    }

    Ok(items)
}

/// Like [`decode_reviews`], but never fails.
///
/// Undecodable output yields no items and a warning carrying the raw text.
///
/// # Examples
///
/// ```
/// use kensa_review::response::parse_review_items;
///
/// assert!(parse_review_items("").is_empty());
/// assert!(parse_review_items("{\"reviews\": [").is_empty());
/// ```
pub fn parse_review_items(raw: &str) -> Vec<ReviewItem> {
    match decode_reviews(raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, raw, "discarding undecodable engine response");
            Vec::new()
        }
    }
}

/// Turn the engine's answer for one file into a [`FileReview`].
///
/// # Errors
///
/// Returns [`KensaError::Decode`] if a structured response cannot be decoded.
pub fn parse_response(raw: &str, variant: PromptVariant) -> Result<FileReview, KensaError> {
    match variant {
        PromptVariant::Narrative => Ok(FileReview::Narrative(raw.trim().to_string())),
        PromptVariant::Structured => decode_reviews(raw).map(FileReview::Items),
    }
}

fn line_ref(value: Option<&Value>) -> LineRef {
    let number = match value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match number.and_then(|n| u32::try_from(n).ok()) {
        Some(n) if n > 0 => LineRef::Line(n),
        _ => LineRef::Unattributed,
    }
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string, e.g. ```json
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
