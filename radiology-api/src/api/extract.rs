//! Extractors whose rejections use the REST error body

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::entities::common::ErrorResponse;

/// JSON body rejected with a `bad_request` error instead of plain text
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ErrorResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            warn!("Rejected request body: {}", rejection.body_text());
            ErrorResponse::bad_request(&rejection.body_text())
        })?;
        Ok(ApiJson(value))
    }
}

/// Path parameters rejected with a `bad_request` error instead of plain text
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await.map_err(|rejection| {
            warn!("Rejected path parameters: {}", rejection.body_text());
            ErrorResponse::bad_request(&rejection.body_text())
        })?;
        Ok(ApiPath(value))
    }
}
