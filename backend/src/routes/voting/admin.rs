use bcrypt::verify;
use chrono::{TimeZone, Utc};
use rocket::http::{ContentType, Cookie, CookieJar, SameSite, Status};
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::State;
use rust_xlsxwriter::Workbook;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{
    AdminLoginRequest, Candidate, CreateTokensRequest, NewCandidate, StatsResponse, TokenData,
};
use crate::AppState;

/// Largest token batch a single request may issue.
const MAX_TOKEN_BATCH: u32 = 1000;

// Helper function to check if admin is authenticated
fn is_admin_authenticated(cookies: &CookieJar<'_>, state: &AppState) -> bool {
    if let Some(cookie) = cookies.get("admin_auth") {
        state
            .admin_sessions
            .lock()
            .map(|sessions| sessions.contains(cookie.value()))
            .unwrap_or(false)
    } else {
        false
    }
}

// Admin login endpoint
#[post("/admin/login", format = "json", data = "<login>")]
pub async fn admin_login(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    login: Json<AdminLoginRequest>,
) -> Result<Status, Status> {
    if verify(&login.password, &state.admin_password_hash).unwrap_or(false) {
        let token = Uuid::new_v4().to_string();
        state
            .admin_sessions
            .lock()
            .map_err(|e| {
                error!("Error storing admin session: {}", e);
                Status::InternalServerError
            })?
            .insert(token.clone());

        let mut cookie = Cookie::new("admin_auth", token);
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_path("/");
        cookies.add(cookie);
        Ok(Status::Ok)
    } else {
        // Clear any existing invalid cookie
        cookies.remove(Cookie::from("admin_auth"));
        Err(Status::Unauthorized)
    }
}

// Admin logout endpoint
#[post("/admin/logout")]
pub async fn admin_logout(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
) -> Result<Status, Status> {
    if let Some(cookie) = cookies.get("admin_auth") {
        if let Ok(mut sessions) = state.admin_sessions.lock() {
            sessions.remove(cookie.value());
        }
        cookies.remove(Cookie::from("admin_auth"));
    }
    Ok(Status::Ok)
}

// Check if admin is authenticated
#[get("/admin/check")]
pub async fn admin_check(state: &State<AppState>, cookies: &CookieJar<'_>) -> Json<bool> {
    Json(is_admin_authenticated(cookies, state))
}

// Route to issue a batch of single-use tokens - requires authentication
#[post("/tokens/batch", format = "json", data = "<request>")]
pub async fn create_tokens(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    request: Json<CreateTokensRequest>,
) -> Result<Json<Vec<TokenData>>, Status> {
    if !is_admin_authenticated(cookies, state) {
        return Err(Status::Unauthorized);
    }
    if request.amount == 0 || request.amount > MAX_TOKEN_BATCH {
        return Err(Status::BadRequest);
    }

    let tokens = state.store.create_tokens(request.amount).map_err(|e| {
        error!("Error creating tokens: {}", e);
        Status::InternalServerError
    })?;
    info!(amount = tokens.len(), "token batch issued");
    Ok(Json(tokens))
}

// Route to list all tokens, newest first - requires authentication
#[get("/tokens")]
pub async fn list_tokens(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
) -> Result<Json<Vec<TokenData>>, Status> {
    if !is_admin_authenticated(cookies, state) {
        return Err(Status::Unauthorized);
    }
    state.store.tokens_snapshot().map(Json).map_err(|e| {
        error!("Error loading tokens: {}", e);
        Status::InternalServerError
    })
}

// Live token feed - requires authentication
#[get("/tokens/stream")]
pub fn stream_tokens(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
) -> Result<EventStream![Event], Status> {
    if !is_admin_authenticated(cookies, state) {
        return Err(Status::Unauthorized);
    }
    let mut rx = state.store.subscribe_tokens();
    Ok(EventStream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            yield Event::json(&snapshot);
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

// Route to export the token ledger to Excel - requires authentication
#[get("/tokens/export")]
pub async fn export_tokens_excel(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
) -> Result<(ContentType, Vec<u8>), Status> {
    if !is_admin_authenticated(cookies, state) {
        return Err(Status::Unauthorized);
    }

    let tokens = state.store.tokens_snapshot().map_err(|e| {
        error!("Error loading tokens: {}", e);
        Status::InternalServerError
    })?;

    // Create Excel
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    let headers = ["Token", "Status", "Generated At", "Used At"];
    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, *header)
            .map_err(|_| Status::InternalServerError)?;
    }

    for (i, token) in tokens.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet
            .write_string(row, 0, &token.id)
            .map_err(|_| Status::InternalServerError)?;
        worksheet
            .write_string(row, 1, if token.is_used { "used" } else { "unused" })
            .map_err(|_| Status::InternalServerError)?;
        worksheet
            .write_string(row, 2, &format_millis(token.generated_at))
            .map_err(|_| Status::InternalServerError)?;
        worksheet
            .write_string(row, 3, &token.used_at.map(format_millis).unwrap_or_default())
            .map_err(|_| Status::InternalServerError)?;
    }

    worksheet.autofit();

    let buf = workbook.save_to_buffer().map_err(|e| {
        error!("Error saving excel buffer: {}", e);
        Status::InternalServerError
    })?;

    Ok((
        ContentType::new(
            "application",
            "vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ),
        buf,
    ))
}

fn format_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

// Route to add a candidate to the ballot - requires authentication
#[post("/candidates", format = "json", data = "<request>")]
pub async fn add_candidate(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    request: Json<NewCandidate>,
) -> Result<Json<Candidate>, Status> {
    if !is_admin_authenticated(cookies, state) {
        return Err(Status::Unauthorized);
    }
    if request.name.trim().is_empty() {
        return Err(Status::BadRequest);
    }

    state
        .store
        .add_candidate(request.into_inner())
        .map(Json)
        .map_err(|e| {
            error!("Error adding candidate: {}", e);
            Status::InternalServerError
        })
}

// Route to remove a candidate - requires authentication. Votes already
// counted for the removed candidate are not retrievable afterwards.
#[delete("/candidates/<id>")]
pub async fn delete_candidate(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    id: &str,
) -> Result<Status, Status> {
    if !is_admin_authenticated(cookies, state) {
        return Err(Status::Unauthorized);
    }
    match state.store.delete_candidate(id) {
        Ok(()) => Ok(Status::NoContent),
        Err(crate::error::ElectionError::CandidateNotFound) => Err(Status::NotFound),
        Err(e) => {
            error!("Error deleting candidate: {}", e);
            Err(Status::InternalServerError)
        }
    }
}

// Admin route to get headline stats
#[get("/admin/stats")]
pub async fn get_stats(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
) -> Result<Json<StatsResponse>, Status> {
    if !is_admin_authenticated(cookies, state) {
        return Err(Status::Unauthorized);
    }

    let candidates = state.store.candidates_snapshot().map_err(|e| {
        error!("Error loading candidates: {}", e);
        Status::InternalServerError
    })?;
    let tokens = state.store.tokens_snapshot().map_err(|e| {
        error!("Error loading tokens: {}", e);
        Status::InternalServerError
    })?;

    let total_votes = candidates.iter().map(|c| c.votes).sum();
    let tokens_used = tokens.iter().filter(|t| t.is_used).count();
    let participation_percent = if tokens.is_empty() {
        0
    } else {
        ((tokens_used as f64 / tokens.len() as f64) * 100.0).round() as u32
    };

    Ok(Json(StatsResponse {
        total_votes,
        tokens_issued: tokens.len(),
        tokens_used,
        participation_percent,
    }))
}
