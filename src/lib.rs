pub mod config;
pub mod db;
pub mod event_sourcing;
pub mod metrics;
pub mod personal_data;
