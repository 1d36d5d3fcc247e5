use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::State;
use tracing::{error, info, warn};

use crate::models::{
    ActionResponse, Candidate, CastVoteRequest, ValidateTokenRequest, ValidateTokenResponse,
};
use crate::store::normalize_token;
use crate::AppState;

// Route to open an anonymous voting session. The identity is an opaque
// id gating write access; it carries no credentials and does not
// identify the voter.
#[post("/session")]
pub async fn create_session(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
) -> Json<ActionResponse> {
    match state.store.issue_identity() {
        Ok(identity) => {
            let mut cookie = Cookie::new("session_token", identity);
            cookie.set_http_only(true);
            cookie.set_same_site(SameSite::Lax);
            cookie.set_path("/");
            cookies.add(cookie);
            Json(ActionResponse::ok("Session established."))
        }
        Err(e) => {
            error!("Error issuing session identity: {}", e);
            Json(ActionResponse::err(e))
        }
    }
}

// Route to pre-check a token before showing the ballot. Advisory only:
// the token is not reserved, and the vote transaction remains the
// final authority.
#[post("/tokens/validate", format = "json", data = "<request>")]
pub async fn validate_token(
    state: &State<AppState>,
    request: Json<ValidateTokenRequest>,
) -> Json<ValidateTokenResponse> {
    match state.store.validate_token(&request.token) {
        Ok(()) => Json(ValidateTokenResponse::valid()),
        Err(e) => Json(ValidateTokenResponse::invalid(e)),
    }
}

// Route to get the current ballot, ordered by noUrut
#[get("/candidates")]
pub async fn get_candidates(state: &State<AppState>) -> Result<Json<Vec<Candidate>>, Status> {
    state.store.candidates_snapshot().map(Json).map_err(|e| {
        error!("Error loading candidates: {}", e);
        Status::InternalServerError
    })
}

// Live candidate feed: pushes the full ordered snapshot whenever any
// candidate changes. Read-only; never drives the vote path.
#[get("/candidates/stream")]
pub fn stream_candidates(state: &State<AppState>) -> EventStream![Event] {
    let mut rx = state.store.subscribe_candidates();
    EventStream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            yield Event::json(&snapshot);
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

// Route to cast a vote: the atomic redeem-and-increment transaction.
// Every failure is recovered into the structured body.
#[post("/votes", format = "json", data = "<request>")]
pub async fn cast_vote(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    request: Json<CastVoteRequest>,
) -> Json<ActionResponse> {
    let identity = cookies.get("session_token").map(|c| c.value().to_owned());
    let token = normalize_token(&request.token);

    match state
        .store
        .cast_vote(identity.as_deref(), &token, &request.candidate_id)
    {
        Ok(()) => {
            info!(token = %token, candidate = %request.candidate_id, "vote recorded");
            Json(ActionResponse::ok("Vote recorded. Thank you for participating."))
        }
        Err(e) => {
            warn!(token = %token, candidate = %request.candidate_id, code = e.code(), "vote rejected");
            Json(ActionResponse::err(e))
        }
    }
}
