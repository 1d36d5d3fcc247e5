use rocket::serde::{Deserialize, Serialize};

use crate::error::ElectionError;

/// A candidate on the ballot. `no_urut` is the admin-assigned display
/// ordering number and the primary sort key for every candidate list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub no_urut: i64,
    pub vision: String,
    pub mission: String,
    pub photo_url: String,
    pub votes: u64,
}

/// A single-use access token. The token string itself is the identity.
/// Timestamps are Unix-epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct TokenData {
    pub id: String,
    pub is_used: bool,
    pub generated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct NewCandidate {
    pub name: String,
    pub no_urut: i64,
    pub vision: String,
    pub mission: String,
    pub photo_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct CreateTokensRequest {
    pub amount: u32,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub token: String,
    pub candidate_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct AdminLoginRequest {
    pub password: String,
}

/// Advisory pre-check result. Validation never reserves the token; the
/// vote transaction remains the final authority.
#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ValidateTokenResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub message: String,
}

impl ValidateTokenResponse {
    pub fn valid() -> Self {
        Self {
            valid: true,
            code: None,
            message: "Token valid.".to_string(),
        }
    }

    pub fn invalid(err: ElectionError) -> Self {
        Self {
            valid: false,
            code: Some(err.code()),
            message: err.to_string(),
        }
    }
}

/// Structured outcome body for state-changing voter operations.
#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            code: None,
            message: message.to_string(),
        }
    }

    pub fn err(err: ElectionError) -> Self {
        Self {
            success: false,
            code: Some(err.code()),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_votes: u64,
    pub tokens_issued: usize,
    pub tokens_used: usize,
    pub participation_percent: u32,
}
