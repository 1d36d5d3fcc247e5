// Main application entry point

#[macro_use]
extern crate rocket;

mod config;
mod error;
mod models;
mod routes;
mod store;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use rocket::fs::FileServer;
use rocket::{Build, Rocket};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use routes::voting::{admin, client};
use store::ElectionStore;

pub struct AppState {
    pub store: ElectionStore,
    pub admin_password_hash: String,
    pub admin_sessions: Mutex<HashSet<String>>,
}

fn build(config: AppConfig) -> Rocket<Build> {
    let figment = rocket::config::Config::figment().merge(("port", config.rocket_port));

    let state = AppState {
        store: ElectionStore::new(),
        admin_password_hash: config.admin_password_hash,
        admin_sessions: Mutex::new(HashSet::new()),
    };

    let mut rocket = rocket::custom(figment)
        .manage(state)
        .mount(
            "/api",
            routes![
                client::create_session,
                client::validate_token,
                client::get_candidates,
                client::stream_candidates,
                client::cast_vote,
                admin::admin_login,
                admin::admin_logout,
                admin::admin_check,
                admin::create_tokens,
                admin::list_tokens,
                admin::stream_tokens,
                admin::export_tokens_excel,
                admin::add_candidate,
                admin::delete_candidate,
                admin::get_stats,
            ],
        )
        .register("/api", catchers![routes::not_found, routes::unauthorized]);

    if let Some(dir) = config.static_dir {
        if Path::new(&dir).is_dir() {
            rocket = rocket.mount("/", FileServer::from(dir));
        } else {
            tracing::warn!(dir = %dir, "static directory not found, skipping file server");
        }
    }

    rocket
}

#[rocket::launch]
fn rocket() -> _ {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    build(AppConfig::load())
}
