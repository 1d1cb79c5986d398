pub mod config;
pub mod coordinator;
pub mod error;
pub mod gallery;
pub mod metadata;
pub mod processor;
pub mod service;
pub mod service_clients;
pub mod store;
pub mod viewport;
pub mod walker;
