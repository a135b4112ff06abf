pub mod display;
pub mod types;
pub mod validate;

pub use display::display_config;
pub use types::{AppConfig, RouteConfig, ServerConfig};
pub use validate::validate_configs;

use parser::FromYaml;

impl AppConfig {
    pub fn from_str(source: &str) -> crate::error::Result<Self> {
        let parsed = <Self as FromYaml>::from_str(source)?;
        let servers = validate_configs(parsed.servers);
        Ok(Self { servers })
    }

    pub fn display_config(&self) {
        display::display_config(&self.servers);
    }
}
