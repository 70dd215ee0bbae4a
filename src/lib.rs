pub mod app;
pub mod config;
pub mod migration;
pub mod shared;
pub mod wizard;
