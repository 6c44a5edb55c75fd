//! Caller-identity extractor.
//!
//! The identity arrives already authenticated in the `x-hush-identity`
//! header; this module only parses it.

use axum::{extract::FromRequestParts, http::request::Parts};
use hush_core::identity::Identity;

use crate::error::ApiError;

/// Header carrying the caller's identity as a UUID.
pub const IDENTITY_HEADER: &str = "x-hush-identity";

/// The identity a request acts as.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let raw = parts
      .headers
      .get(IDENTITY_HEADER)
      .ok_or_else(|| ApiError::Unauthorized(format!("missing {IDENTITY_HEADER} header")))?
      .to_str()
      .map_err(|_| ApiError::BadRequest(format!("{IDENTITY_HEADER} is not valid text")))?;

    Ok(Caller(raw.parse::<Identity>()?))
  }
}
