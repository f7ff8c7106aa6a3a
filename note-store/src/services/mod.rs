//! Services module
//!
//! Business logic that coordinates the repositories with the outside
//! world: notification scheduling and device authentication.

pub mod notes;
pub mod notification;
pub mod reminders;

pub use notes::NotesService;
pub use notification::{AuthGate, NotificationScheduler};
pub use reminders::RemindersService;
