// Error taxonomy for the voting service

use thiserror::Error;

/// Every failure a voting operation can surface. All of these are
/// recovered at the transaction boundary and returned to the caller as
/// a structured body; none escape as an unhandled fault.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ElectionError {
    #[error("Token not found. Check the code and try again.")]
    TokenNotFound,

    #[error("This token has already been used.")]
    TokenAlreadyUsed,

    #[error("Candidate not found. The ballot may have changed; refresh and try again.")]
    CandidateNotFound,

    /// Write rejected by the store's access gate. Distinct from token
    /// errors so operators can spot a session-gating misconfiguration.
    #[error("Write access denied by the vote store. No active voting session; open a session and retry.")]
    PermissionDenied,

    #[error("Could not reach the vote store. Check your connection and try again.")]
    ConnectivityFailure,

    #[error("Could not obtain a session identity. Refresh and try again.")]
    AuthUnavailable,
}

impl ElectionError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            ElectionError::TokenNotFound => "TOKEN_NOT_FOUND",
            ElectionError::TokenAlreadyUsed => "TOKEN_ALREADY_USED",
            ElectionError::CandidateNotFound => "CANDIDATE_NOT_FOUND",
            ElectionError::PermissionDenied => "PERMISSION_DENIED",
            ElectionError::ConnectivityFailure => "CONNECTIVITY_FAILURE",
            ElectionError::AuthUnavailable => "AUTH_UNAVAILABLE",
        }
    }
}
