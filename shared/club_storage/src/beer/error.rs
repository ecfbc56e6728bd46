//! Error types for beer storage operations

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::{
    delete_item::DeleteItemError, get_item::GetItemError, put_item::PutItemError,
    query::QueryError, update_item::UpdateItemError,
};
use thiserror::Error;

/// Result type alias for beer storage operations
pub type BeerStorageResult<T> = Result<T, BeerStorageError>;

/// Storage error types for beer operations
#[derive(Debug, Error)]
pub enum BeerStorageError {
    /// Failed to insert beer into `DynamoDB`
    #[error("Failed to insert beer into DynamoDB: {0:?}")]
    DynamoDbPutError(#[from] SdkError<PutItemError>),

    /// Failed to get beer from `DynamoDB`
    #[error("Failed to get beer from DynamoDB: {0:?}")]
    DynamoDbGetError(#[from] SdkError<GetItemError>),

    /// Failed to query beers from `DynamoDB`
    #[error("Failed to query beers from DynamoDB: {0:?}")]
    DynamoDbQueryError(#[from] SdkError<QueryError>),

    /// Failed to update beer in `DynamoDB`
    #[error("Failed to update beer in DynamoDB: {0:?}")]
    DynamoDbUpdateError(#[from] SdkError<UpdateItemError>),

    /// Failed to delete beer from `DynamoDB`
    #[error("Failed to delete beer from DynamoDB: {0:?}")]
    DynamoDbDeleteError(#[from] SdkError<DeleteItemError>),

    /// The beer does not exist
    #[error("Beer not found: {0}")]
    NotFound(String),

    /// The storage backend could not be reached or refused the request
    #[error("Beer storage unavailable: {0}")]
    Unavailable(String),

    /// Failed to parse beer from `DynamoDB` item
    #[error("Failed to parse beer: {0}")]
    SerializationError(String),
}

impl From<serde_dynamo::Error> for BeerStorageError {
    fn from(err: serde_dynamo::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
