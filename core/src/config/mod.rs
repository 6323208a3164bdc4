mod load;
mod store;
mod types;

pub use load::{dump_path, load_config, CONFIG_ENV};
pub use store::{parse_literal, Configuration};
pub use types::LoggingConfig;
