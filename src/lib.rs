//! gemchat: chat client for the Gemini gateway.
//!
//! [`chat::ChatSession`] owns the conversation and runs every user action
//! against an [`ai::Backend`]; [`render`] turns snapshots into something a
//! display surface can show.

pub mod ai;
pub mod chat;
pub mod commands;
pub mod config;
pub mod probe;
pub mod render;
pub mod types;
