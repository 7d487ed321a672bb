pub mod medication;
pub mod mood;
pub mod user;
