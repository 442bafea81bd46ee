pub mod auth;
pub mod availability;
pub mod db;
pub mod errors;
pub mod identity;
pub mod models;
pub mod notify;
pub mod routes;
pub mod scheduling;
pub mod state;
pub mod status;
pub mod verification;
