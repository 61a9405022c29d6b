//! Request extractors that report failures through the API error envelope

use axum::extract::FromRequest;

use crate::error::Error;

/// `Json<T>` whose rejections become `Error::Validation`
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct ApiJson<T>(pub T);
