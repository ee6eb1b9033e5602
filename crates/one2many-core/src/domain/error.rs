//! Error taxonomy for broadcast operations.
//!
//! The `Display` text of every variant is exactly what the requesting
//! participant sees in the `message` field of a rejected `masterResponse` or
//! `viewerResponse`, so changing a string here changes the wire protocol.

use thiserror::Error;

/// Why a `master` or `viewer` request did not produce an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// A master already exists (active or still being set up).
    #[error("Another user is currently acting as sender. Try again later ...")]
    AlreadyMaster,

    /// This session identifier already has a viewer registration.
    #[error("You are already viewing in this session. Use a different browser to add additional viewers.")]
    DuplicateViewer,

    /// There is no master, or the master's endpoint is not ready yet.
    #[error("No active sender now. Become sender or . Try again later ...")]
    NoActiveSender,

    /// The operation was superseded by a state change while it was suspended.
    #[error("Request was cancelled by the user. You will not be sending any longer")]
    Cancelled,

    /// The media pipeline reported a failure.
    #[error("{0}")]
    Pipeline(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_master_message() {
        assert!(BroadcastError::AlreadyMaster
            .to_string()
            .starts_with("Another user is currently acting as sender"));
    }

    #[test]
    fn test_duplicate_viewer_message_mentions_already_viewing() {
        assert!(BroadcastError::DuplicateViewer
            .to_string()
            .contains("already viewing"));
    }

    #[test]
    fn test_no_active_sender_message() {
        assert!(BroadcastError::NoActiveSender
            .to_string()
            .starts_with("No active sender"));
    }

    #[test]
    fn test_pipeline_message_is_passed_through() {
        let err = BroadcastError::Pipeline("endpoint creation failed".to_string());
        assert_eq!(err.to_string(), "endpoint creation failed");
    }
}
