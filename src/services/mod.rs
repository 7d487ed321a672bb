pub mod analytics;
pub mod medications;
pub mod reminders;
