//! API endpoint handlers, one module per resource.

pub mod health;
pub mod result;
pub mod score;
pub mod targets;
