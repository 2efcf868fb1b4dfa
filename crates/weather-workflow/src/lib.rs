pub mod cache;
pub mod config;
pub mod error;
pub mod feedback;
pub mod geocoding;
pub mod model;
pub mod normalize;
pub mod providers;
pub mod render;
pub mod service;
pub mod settings;
