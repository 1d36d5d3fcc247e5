pub mod admin;
pub mod client;
