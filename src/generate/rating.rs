//! Rating responses from the curation prompt.

use super::extract_json_from_text;
use crate::models::{QaPair, Result, SynthkitError};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static RATING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""?rating"?\s*[:=]\s*"?(\d+(?:\.\d+)?)"#).expect("static rating pattern")
});

fn rating_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Attach ratings from a model response to `pairs`, in order.
///
/// Reads the JSON array (or single object) first; falls back to every
/// `rating: n` in the raw text. Ratings are clamped to 0-10. Pairs without a
/// rating are dropped from the result.
///
/// B_i(response holds at least one rating) → DataFormat
pub fn parse_ratings(response: &str, pairs: &[QaPair]) -> Result<Vec<QaPair>> {
    let from_json: Vec<f64> = match extract_json_from_text(response) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("rating").and_then(rating_value))
            .collect(),
        Some(obj @ Value::Object(_)) => obj.get("rating").and_then(rating_value).into_iter().collect(),
        _ => Vec::new(),
    };

    let ratings = if from_json.is_empty() {
        RATING_RE
            .captures_iter(response)
            .filter_map(|caps| caps[1].parse::<f64>().ok())
            .collect()
    } else {
        from_json
    };

    if ratings.is_empty() {
        return Err(SynthkitError::DataFormat(
            "No ratings found in the model response".to_string(),
        ));
    }

    Ok(pairs
        .iter()
        .zip(ratings)
        .map(|(pair, rating)| QaPair {
            rating: Some(rating.clamp(0.0, 10.0)),
            ..pair.clone()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    fn pairs(n: usize) -> Vec<QaPair> {
        (0..n).map(|i| QaPair::new(format!("Q{i}?"), format!("A{i}."))).collect()
    }

    #[test]
    fn test_parse_ratings_from_json() {
        let response = r#"[
            {"question": "Q0?", "answer": "A0.", "rating": 8},
            {"question": "Q1?", "answer": "A1.", "rating": "6.5"}
        ]"#;
        let rated = parse_ratings(response, &pairs(2)).unwrap();
        assert_eq!(rated[0].rating, Some(8.0));
        assert_eq!(rated[1].rating, Some(6.5));
        // Text comes from the originals, not the echoed response.
        assert_eq!(rated[1].question, "Q1?");
    }

    #[test]
    fn test_parse_ratings_fallback_regex() {
        let response = r#"Here are ratings: {"question": "Q0?", "rating": 9}, {"question": "Q1?", "rating": 12},"#;
        let rated = parse_ratings(response, &pairs(3)).unwrap();
        assert_eq!(rated.len(), 2);
        assert_eq!(rated[0].rating, Some(9.0));
        assert_eq!(rated[1].rating, Some(10.0));
    }

    #[test]
    fn test_parse_ratings_none_found() {
        let err = parse_ratings("I think they are all fine.", &pairs(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }
}
