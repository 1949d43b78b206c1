// Library exports for artsite
// The binary and the integration tests both build the server from here

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod storage;
