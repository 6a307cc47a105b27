pub mod cache_admin;
pub mod dto;
pub mod health;
pub mod hotel;
pub mod profile;
pub mod rate_limit;
pub mod response;
mod router;
pub mod schedule;
pub mod shops;
pub mod users;
pub mod validation;

pub use router::{AppState, create_router};
