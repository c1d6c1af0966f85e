pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod migration;
pub mod models;
pub mod paths;
pub mod prompt;
pub mod repository;
pub mod services;
pub mod stage;
