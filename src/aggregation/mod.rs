pub mod aggregate;
pub mod conflict;
