pub mod app;
pub mod cmd;
pub mod config;
pub mod logging;
pub mod report;
