//! JSON body extractors answering with an OCPI envelope
//!
//! [`OcpiJson`] only deserializes; [`ValidatedJson`] also runs
//! `validator::Validate`. A body that does not parse is status 2001 with
//! HTTP 400, one that parses but fails validation is 2001 with HTTP 422.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::envelope::OcpiError;
use crate::domain::ocpi::status;

/// Deserialized and validated request body.
pub struct ValidatedJson<T>(pub T);

/// Deserialized request body.
pub struct OcpiJson<T>(pub T);

pub enum BodyRejection {
    Malformed(JsonRejection),
    Invalid(ValidationErrors),
}

/// Flatten nested validation errors into `path: message` pairs, so that a
/// bad `roles[0].business_details.name` is reported by its full path.
fn describe(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => out.extend(errs.iter().map(|e| {
                let msg = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{path}: {msg}")
            })),
            ValidationErrorsKind::Struct(inner) => describe(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    describe(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

impl IntoResponse for BodyRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Malformed(rejection) => {
                OcpiError::invalid_parameters(format!("Invalid JSON: {}", rejection.body_text()))
                    .into_response()
            }
            Self::Invalid(errors) => {
                let mut messages = Vec::new();
                describe(&errors, "", &mut messages);
                messages.sort();
                OcpiError::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    status::INVALID_PARAMETERS,
                    messages.join("; "),
                )
                .into_response()
            }
        }
    }
}

impl<S, T> FromRequest<S> for OcpiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = BodyRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| OcpiJson(value))
            .map_err(BodyRejection::Malformed)
    }
}

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = BodyRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let OcpiJson(value) = OcpiJson::<T>::from_request(req, state).await?;
        value.validate().map_err(BodyRejection::Invalid)?;
        Ok(ValidatedJson(value))
    }
}
