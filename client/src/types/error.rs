//! Error taxonomy shared by every club operation

use club_storage::beer::BeerStorageError;
use club_storage::media::BucketError;
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::crop::CropError;

/// Result type for club operations
pub type ClubResult<T> = Result<T, ClubError>;

/// Error returned by every user-facing club operation
///
/// Each error is terminal for the operation that raised it and carries a
/// machine code, a message that can be shown to the member, and whether
/// trying again may help.
#[derive(Debug, Error)]
pub enum ClubError {
    /// Form input was rejected before any network call
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The selected image could not be decoded or cropped
    #[error(transparent)]
    Crop(#[from] CropError),

    /// The auth collaborator failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The row storage collaborator failed
    #[error(transparent)]
    Storage(#[from] BeerStorageError),

    /// The blob storage collaborator failed
    #[error(transparent)]
    Blob(#[from] BucketError),

    /// The operation needs a signed-in member
    #[error("Not signed in")]
    NotSignedIn,
}

impl ClubError {
    /// Machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_)
            | Self::Auth(AuthError::InvalidEmail(_) | AuthError::InvalidCode) => "validation_error",
            Self::Crop(CropError::Decode(_) | CropError::EmptyImage) => "decode_error",
            Self::Crop(_) => "crop_error",
            Self::Auth(AuthError::Rejected { .. }) => "auth_rejected",
            Self::Auth(AuthError::SessionStore(_) | AuthError::Serialization(_)) => {
                "session_error"
            }
            Self::Auth(_) => "auth_unavailable",
            Self::Storage(BeerStorageError::NotFound(_)) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Blob(BucketError::ObjectExists(_)) => "already_exists",
            Self::Blob(BucketError::UpstreamError(_)) => "upstream_error",
            Self::Blob(_) => "blob_error",
            Self::NotSignedIn => "not_signed_in",
        }
    }

    /// Message suitable for showing to the member
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Auth(AuthError::InvalidEmail(_)) => "Enter a valid email address".to_string(),
            Self::Auth(AuthError::InvalidCode) => "The code must be 6 digits".to_string(),
            Self::Auth(AuthError::Rejected { message, .. }) => message.clone(),
            Self::Auth(_) => "Could not reach the sign-in service".to_string(),
            Self::Crop(CropError::Decode(_) | CropError::EmptyImage) => {
                "The selected file is not a readable image".to_string()
            }
            Self::Crop(_) => "The image could not be cropped".to_string(),
            Self::Storage(BeerStorageError::NotFound(_)) => "The beer no longer exists".to_string(),
            Self::Storage(_) => "Could not save or load beers".to_string(),
            Self::Blob(_) => "Could not upload or load the image".to_string(),
            Self::NotSignedIn => "Sign in to continue".to_string(),
        }
    }

    /// Whether repeating the operation unchanged may succeed
    #[must_use]
    pub const fn allow_retry(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Crop(_) | Self::NotSignedIn => false,
            Self::Auth(
                AuthError::Http(_) | AuthError::Network(_) | AuthError::SessionStore(_),
            ) => true,
            Self::Auth(_) => false,
            Self::Storage(
                BeerStorageError::NotFound(_) | BeerStorageError::SerializationError(_),
            ) => false,
            Self::Storage(_) => true,
            Self::Blob(
                BucketError::ObjectExists(_)
                | BucketError::ConfigError(_)
                | BucketError::InvalidInput(_),
            ) => false,
            Self::Blob(_) => true,
        }
    }

    /// Logs the error at a level matching its origin
    pub fn log(&self) {
        match self {
            Self::Validation(_)
            | Self::NotSignedIn
            | Self::Crop(_)
            | Self::Auth(
                AuthError::InvalidEmail(_) | AuthError::InvalidCode | AuthError::Rejected { .. },
            )
            | Self::Storage(BeerStorageError::NotFound(_)) => {
                tracing::warn!("Client error: {} - {self}", self.code());
            }
            _ => tracing::error!("Upstream error: {} - {self}", self.code()),
        }
    }
}

/// Joins every field message, ordered by field name
impl From<validator::ValidationErrors> for ClubError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));

        let message = fields
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    error
                        .message
                        .as_ref()
                        .map_or_else(|| format!("{field} is invalid"), ToString::to_string)
                })
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::Validation(message)
    }
}

/// Structured outcome handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub ok: bool,
    pub allow_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub message: String,
}

impl Feedback {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            allow_retry: false,
            code: None,
            message: message.into(),
        }
    }
}

impl From<&ClubError> for Feedback {
    fn from(err: &ClubError) -> Self {
        Self {
            ok: false,
            allow_retry: err.allow_retry(),
            code: Some(err.code()),
            message: err.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Form {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
        #[validate(range(max = 5, message = "Rating must be between 0 and 5"))]
        rating: u8,
    }

    #[test]
    fn test_validation_errors_join_in_field_order() {
        let err = ClubError::from(
            Form {
                name: String::new(),
                rating: 9,
            }
            .validate()
            .unwrap_err(),
        );

        assert_eq!(err.code(), "validation_error");
        assert_eq!(
            err.user_message(),
            "Name is required; Rating must be between 0 and 5"
        );
        assert!(!err.allow_retry());
    }

    #[test]
    fn test_outage_is_retryable() {
        let err = ClubError::from(BucketError::UpstreamError("503".to_string()));
        assert_eq!(err.code(), "upstream_error");
        assert!(err.allow_retry());

        let err = ClubError::from(BeerStorageError::Unavailable("timeout".to_string()));
        assert_eq!(err.code(), "storage_error");
        assert!(err.allow_retry());
    }

    #[test]
    fn test_feedback_serializes_camel_case() {
        let feedback = Feedback::from(&ClubError::NotSignedIn);
        let json = serde_json::to_value(&feedback).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "ok": false,
                "allowRetry": false,
                "code": "not_signed_in",
                "message": "Sign in to continue",
            })
        );

        let json = serde_json::to_value(Feedback::success("Saved")).unwrap();
        assert_eq!(json, serde_json::json!({ "ok": true, "allowRetry": false, "message": "Saved" }));
    }
}
