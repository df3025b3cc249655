//! Error types for sweep algorithms

use thiserror::Error;

/// Failures of the preprocessing, normal estimation and registration stages
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid range: minimum {min} is greater than maximum {max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("Point {index} has {found} valid neighbors, at least 3 are needed to span a plane")]
    InsufficientNeighbors { index: usize, found: usize },

    #[error("Registration diverged in iteration {iteration}: no correspondences within {max_correspondence_distance}")]
    RegistrationDiverged {
        iteration: usize,
        max_correspondence_distance: f64,
    },

    #[error("Ill-conditioned least-squares problem in iteration {iteration} (eigenvalue ratio {ratio:e})")]
    IllConditioned { iteration: usize, ratio: f64 },

    #[error("Registration cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },
}

impl Error {
    pub(crate) fn invalid<S: Into<String>>(message: S) -> Self {
        Error::InvalidParameter(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
