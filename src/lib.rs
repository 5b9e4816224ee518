//! Telegram LLM gate - Library exports for testing
//!
//! (c) Softlandia 2025

pub mod api;
pub mod bot;
pub mod core;
pub mod infrastructure;
