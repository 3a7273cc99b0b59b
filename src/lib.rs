pub mod app;
pub mod config;
pub mod downloads;
pub mod gateway;
pub mod logging;
pub mod session;
pub mod speech;
pub mod ui;
