//! Core use-case services.
//!
//! # Responsibility
//! - Enforce board-level rules the dispatcher does not know about.
//! - Keep callers decoupled from collection keys and store details.

pub mod board_service;
