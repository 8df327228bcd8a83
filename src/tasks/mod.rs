//! Background Tasks Module
//!
//! Contains background tasks that run periodically while caches are in use.
//!
//! # Tasks
//! - Housekeeping: Purges expired entries from every known cache at the
//!   configured interval

mod housekeeping;

pub use housekeeping::spawn_housekeeping_task;
