//! DocAssist client library.
//!
//! An authenticated HTTP client for the DocAssist backend with coalesced
//! token refresh, typed service wrappers for users, documents and chats, and
//! the client-side chat bookkeeping used by the `docassist` CLI.

pub mod api;
pub mod chat;
pub mod commands;
pub mod config;
pub mod services;
pub mod state;
