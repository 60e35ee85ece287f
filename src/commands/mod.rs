mod config_cmd;
mod inspect;

pub use config_cmd::ConfigCommand;
pub use inspect::InspectCommand;
