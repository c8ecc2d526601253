//! Requester identity.
//!
//! Authentication happens upstream. The gateway forwards the athlete id in
//! the `x-athlete-id` header and this service trusts it.

use axum::{
    extract::FromRequestParts,
    http::{HeaderName, request::Parts},
};

use crate::errors::AppError;

pub static ATHLETE_ID_HEADER: HeaderName = HeaderName::from_static("x-athlete-id");

/// The athlete making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AthleteId(pub i64);

impl<S> FromRequestParts<S> for AthleteId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(&ATHLETE_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or(AppError::Unauthorized)?;
        Ok(AthleteId(id))
    }
}
