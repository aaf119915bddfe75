//! HTTP handlers

pub mod analyze;
pub mod health;
pub mod relationships;
pub mod tables;
