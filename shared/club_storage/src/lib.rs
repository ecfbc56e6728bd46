//! Storage services for the beer club client
//!
//! This crate provides the two persistence collaborators the client talks to:
//! beer rows (`DynamoDB`) and media blobs (S3), each behind a trait so the
//! client can be exercised against in-memory fakes.

pub mod beer;
pub mod media;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
