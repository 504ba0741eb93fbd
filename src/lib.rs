pub mod api;
pub mod app;
pub mod chat;
pub mod cli;
pub mod config;
pub mod graph;
pub mod stream;
