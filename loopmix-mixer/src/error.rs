//! Error types for loopmix-mixer
//!
//! Engine failures never show up here: the loop controller absorbs them at
//! the call site and reports them as `EngineFault` events. Only failures a
//! caller can act on reach this type.

use thiserror::Error;

/// Main error type for loopmix-mixer
#[derive(Error, Debug)]
pub enum Error {
    /// Video source lookup failed
    #[error("Video source error: {0}")]
    Source(String),

    /// The track controller task has already shut down
    #[error("Track {0} controller is closed")]
    ControllerClosed(usize),
}

/// Convenience Result type using loopmix-mixer Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::Source("quota exceeded".to_string()).to_string(),
            "Video source error: quota exceeded"
        );
        assert_eq!(
            Error::ControllerClosed(5).to_string(),
            "Track 5 controller is closed"
        );
    }
}
