//! Core types and concurrency primitives for the Hush messaging backend.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! owns the conversation and user-directory data model, the
//! [`store::ConversationLog`] and [`store::UserDirectory`] traits that
//! storage backends implement, the per-conversation sequence allocator, and
//! the live-session registry that fans committed writes out to connected
//! clients.

pub mod allocator;
pub mod chat;
pub mod directory;
pub mod error;
pub mod event;
mod fanout;
pub mod identity;
pub mod message;
pub mod registry;
pub mod session;
pub mod store;
pub mod user;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
