//! TrackWise
//!
//! Personal finance tracking service:
//! - Records income and expenses in a single-writer in-memory store
//! - Categorises expenses and produces insights through a hosted language model
//! - Refreshes pattern analysis and budget prediction after input settles
//! - Answers questions through a per-session chat assistant
//! - Enumerates every order-preserving path through a list of financial actions
//!
//! DATA FLOW:
//! API → STORE → VIEWS / PATHS → PROMPT ADAPTER → MODEL → VIEW STATE

pub mod api;
pub mod chat;
pub mod config;
pub mod debounce;
pub mod error;
pub mod flows;
pub mod insights;
pub mod llm;
pub mod models;
pub mod paths;
pub mod store;
pub mod views;

pub use error::{Result, TrackwiseError};

// Re-export common types
pub use config::AppConfig;
pub use models::*;
pub use paths::{explore_action_paths, PathEnumerator};
