mod environment;
mod error;

pub use environment::Environment;
pub use error::{ClubError, ClubResult, Feedback};
