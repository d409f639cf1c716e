pub mod app_config;
pub mod config_file;
pub mod logging;
