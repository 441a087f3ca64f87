// Library exports for Valise
// Integration tests drive the HTTP surface through these modules

pub mod auth;
pub mod config;
pub mod currency;
pub mod db;
pub mod error;
pub mod extractors;
pub mod listings;
pub mod matching;
pub mod notifications;
pub mod proposals;
pub mod routes;
pub mod state;
pub mod users;
pub mod visibility;
