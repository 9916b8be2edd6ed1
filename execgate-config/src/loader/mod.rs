mod config;
mod manager;


pub use config::ExecGateConfig;
pub use manager::ConfigManager;
