//! # Shiftdesk
//!
//! A work-schedule and shop-management API server, usable both as a
//! standalone binary and as a library.
//!
//! Persistence is delegated to a pluggable record store: a hosted
//! datasheet service, a PostgREST backend, or an in-process map for
//! development and tests.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shiftdesk::cache::CacheService;
//! use shiftdesk::config::AppConfig;
//! use shiftdesk::server::{AppState, create_router};
//! use shiftdesk::store::MemoryStore;
//!
//! let state = Arc::new(AppState {
//!     store: Arc::new(MemoryStore::new()),
//!     cache: Arc::new(CacheService::new()),
//!     config: AppConfig::for_tests(),
//! });
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod remote;
pub mod server;
pub mod store;
pub mod types;
