//! Beer club client
//!
//! Members sign in with an emailed passcode and keep a shared list of tasted
//! beers, each with an optional cropped photo, plus a club cover image. Rows,
//! blobs and sign-in are delegated to hosted services; this crate holds the
//! crop pipeline and the rules for talking to those services.

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

/// One-time passcode sign-in and the session cache
pub mod auth;

/// Beer editor and beer operations
pub mod beers;

/// The club cover
pub mod cover;

/// Crop frame and JPEG rasterization
pub mod crop;

/// Routing confirmed crops to their destination
pub mod pipeline;

/// The club client handle
pub mod state;

/// Shared types: environment and errors
pub mod types;

pub use state::{ClubClient, ClubSettings};
pub use types::{ClubError, ClubResult, Environment, Feedback};
