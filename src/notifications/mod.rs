//! Notification settings: media plugins, timeslots and destinations.
//!
//! Sending notifications is left to the host; this module only decides where
//! and when a user can be reached.

pub mod media;
pub mod service;

pub use media::{EmailMedia, MediaPlugin, MediaRegistry, SmsMedia};
pub use service::NotificationService;
