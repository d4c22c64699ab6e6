// Core building blocks shared by every Valeris crate: configuration,
// record types, SQLite persistence and the usage-event tracker.

pub mod config;
pub mod db;
pub mod models;
pub mod tracker;
