pub mod models;
pub mod parser;

pub use models::CourierConfig;
pub use parser::{default_config_path, load_config};
