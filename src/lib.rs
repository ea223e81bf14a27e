pub mod assets;
pub mod config;
pub mod db;
pub mod locale;
pub mod pages;
pub mod security;
pub mod server;
