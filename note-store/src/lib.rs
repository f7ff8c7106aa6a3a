//! Note store library
//!
//! Encrypted, tag-aware note persistence over SQLite: repositories for
//! notes and tags, a decrypted-note cache, and duplicate-save protection.

pub mod app;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;

pub use app::{init_tracing, NoteStore};
pub use config::StoreConfig;
pub use error::{AppError, Result};
