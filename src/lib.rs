pub mod api;
pub mod auth;
pub mod claim;
pub mod config;
pub mod db;
pub mod metrics;
pub mod rate_limit;
pub mod scoring;
pub mod tyler;
