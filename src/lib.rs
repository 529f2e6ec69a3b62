// Library exports for OnePanel
// This allows integration tests to build the router and reach the modules

pub mod assets;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod fetch;
pub mod ordering;
pub mod risk;
pub mod routes;
pub mod state;
