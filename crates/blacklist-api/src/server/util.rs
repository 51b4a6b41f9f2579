fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,DELETE,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

fn require_label(label: &str, field: &str) -> Result<String, HttpApiError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(HttpApiError::invalid_request(
            format!("{field} must not be empty"),
            None,
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_steps(steps: Option<u64>) -> Result<u64, HttpApiError> {
    let steps = steps.unwrap_or(1);
    if steps == 0 || steps > MAX_STEPS_PER_REQUEST {
        return Err(HttpApiError::invalid_request(
            "steps is out of range",
            Some(format!("steps={steps} max={MAX_STEPS_PER_REQUEST}")),
        ));
    }
    Ok(steps)
}
