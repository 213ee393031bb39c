//! Error types for the nebula-nursery provisioning workflow.

use thiserror::Error;

/// Errors that can occur while provisioning Nebula identities.
#[derive(Error, Debug)]
pub enum NurseryError {
    /// Operator input is malformed. Handled at the prompt boundary by
    /// re-prompting; only escapes when a non-interactive check fails.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Operator rejected a confirmation summary. Not a failure: the run
    /// ends with exit code 0 and an instruction to re-run.
    #[error("operation cancelled; re-run the tool to enter new values")]
    ConfirmationDeclined,

    /// The external signing binary is missing, not executable, or exited
    /// non-zero.
    #[error("signing tool error: {0}")]
    SigningTool(String),

    /// Vault decryption failed: wrong key or corrupted blob. There is no
    /// recovery path.
    #[error("vault decryption failed: {0}")]
    Decryption(String),

    /// Could not expose the distribution server through a public tunnel.
    #[error("tunnel error: {0}")]
    Tunnel(String),

    /// An external process did not finish within its deadline.
    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    /// The operator interrupted the run. Treated as an aborted completion;
    /// cleanup still runs.
    #[error("interrupted, cleaning up")]
    Interrupted,

    /// Key generation or encryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Configuration file is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<dialoguer::Error> for NurseryError {
    fn from(err: dialoguer::Error) -> Self {
        match err {
            dialoguer::Error::IO(io) => Self::Io(io),
        }
    }
}

impl NurseryError {
    /// Process exit code for this error. The tool exits 0 on every
    /// operator-initiated abort; only unrecovered tool, crypto, and
    /// transport failures are non-zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::ConfirmationDeclined | Self::Interrupted => 0,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, NurseryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_aborts_exit_zero() {
        assert_eq!(NurseryError::ConfirmationDeclined.exit_code(), 0);
        assert_eq!(NurseryError::Validation("bad ip".into()).exit_code(), 0);
        assert_eq!(NurseryError::Interrupted.exit_code(), 0);
    }

    #[test]
    fn test_failures_exit_nonzero() {
        assert_eq!(
            NurseryError::SigningTool("exit status 1".into()).exit_code(),
            1
        );
        assert_eq!(NurseryError::Decryption("tag mismatch".into()).exit_code(), 1);
        assert_eq!(
            NurseryError::Timeout {
                what: "tunnel".into(),
                secs: 30
            }
            .exit_code(),
            1
        );
    }
}
