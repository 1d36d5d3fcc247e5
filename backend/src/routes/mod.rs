// Routes module - organizes all HTTP route handlers

pub mod voting;

use rocket::serde::json::{json, Value};

#[catch(404)]
pub fn not_found() -> Value {
    json!({ "error": "not found" })
}

#[catch(401)]
pub fn unauthorized() {}
