use axum::http::HeaderMap;

use crate::error::AppError;

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

/// Compare the presented token with the configured admin token.
///
/// Runs over the full length of both inputs so the time taken does not
/// reveal the length of a matching prefix.
pub fn verify_admin_token(presented: &str, expected: &str) -> Result<(), AppError> {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();
    let mut mismatch = u8::from(presented.len() != expected.len());
    for (index, byte) in expected.iter().enumerate() {
        mismatch |= byte ^ presented.get(index).copied().unwrap_or(0);
    }

    if mismatch == 0 {
        Ok(())
    } else {
        Err(AppError::unauthorized("Admin token is not valid"))
    }
}
