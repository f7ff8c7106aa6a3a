//! Storage module
//!
//! In-process state owned by a store instance and shared by its
//! repositories: the decrypted note cache and the save lock map.

pub mod cache;
pub mod save_lock;

pub use cache::{CacheTicket, NoteCache};
pub use save_lock::{SaveCoordinator, SaveKey};
