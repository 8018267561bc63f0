mod config_cmd;
mod history;
mod positions;
mod run;
mod zone;

pub use config_cmd::ConfigCommand;
pub use history::HistoryCommand;
pub use positions::PositionsCommand;
pub use run::RunCommand;
pub use zone::ZoneCommand;
