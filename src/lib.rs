pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod http;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reconcile;
pub mod store;
pub mod validate;
