//! HTTP handlers for school-service.

pub mod fees;
pub mod health;
pub mod students;
