// src/lib.rs

pub mod audio;
pub mod config;
pub mod db;
pub mod http;
pub mod liveness;
pub mod platforms;
pub mod repositories;
pub mod services;
pub mod tasks;

pub use config::BotConfig;
pub use db::Database;
pub use http::{DefaultHttpClient, HttpClient};
pub use jukebot_common::error::Error;
