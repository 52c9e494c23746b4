use insight_core::InsightError;

/// Pull a JSON object or array out of model output
///
/// Strips markdown fences, then falls back to the outermost `{...}` or
/// `[...]` span, whichever opens first.
pub fn extract_json(content: &str) -> Result<String, InsightError> {
    let trimmed = content.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if !inner.is_empty() {
                return Ok(inner.to_string());
            }
        }
    }

    let object = trimmed.find('{').zip(trimmed.rfind('}'));
    let array = trimmed.find('[').zip(trimmed.rfind(']'));

    let span = match (object, array) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { a } else { o }),
        (o, a) => o.or(a),
    };

    match span {
        Some((start, end)) if start < end => Ok(trimmed[start..=end].to_string()),
        _ => Err(InsightError::parse("No JSON found in response")),
    }
}
