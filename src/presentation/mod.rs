// Presentation layer - HTTP surface
pub mod app_state;
pub mod dto;
pub mod error;
pub mod handlers;
