pub mod access;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod relay;
pub mod telegram;
