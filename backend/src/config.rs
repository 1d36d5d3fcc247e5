use rocket::figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use rocket::serde::Deserialize;

#[derive(Deserialize, Clone)]
#[serde(crate = "rocket::serde")]
pub struct AppConfig {
    /// bcrypt hash of the admin password.
    #[serde(alias = "ADMIN_PASSWORD_HASH")]
    pub admin_password_hash: String,
    #[serde(default = "default_rocket_port", alias = "ROCKET_PORT")]
    pub rocket_port: u16,
    /// Directory of static frontend files; skipped when absent.
    #[serde(default, alias = "STATIC_DIR")]
    pub static_dir: Option<String>,
}

fn default_rocket_port() -> u16 {
    8000
}

impl AppConfig {
    pub fn load() -> Self {
        Figment::new()
            .merge(Toml::file("Config.toml"))
            .merge(Toml::file("../Config.toml"))
            .merge(Env::raw().only(&["ADMIN_PASSWORD_HASH", "ROCKET_PORT", "STATIC_DIR"]))
            .extract()
            .expect("Failed to load configuration. Ensure Config.toml exists or environment variables are set (ADMIN_PASSWORD_HASH).")
    }
}
