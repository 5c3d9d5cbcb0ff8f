//! Synchronizes OSS Compass activity metrics for locally tracked projects.

pub mod compass;
pub mod config;
pub mod db;
pub mod model;
pub mod server;
pub mod sync;
