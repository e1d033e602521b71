pub mod loader;
pub mod model;

pub use loader::{CONFIG_FILE_NAMES, ConfigLoader};
pub use model::{AppConfig, DatabaseConfig, MigrationsConfig};
