pub mod config;
pub mod delta;
pub mod history;
pub mod params;
pub mod store;
