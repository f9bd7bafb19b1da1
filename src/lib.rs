pub mod analytics;
pub mod config;
pub mod events;
pub mod pipeline;
