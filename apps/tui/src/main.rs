//! Standalone launcher for the annodemo dashboard.

use color_eyre::eyre::Result;

use annodemo_shared::{DatasetRegistry, load_config, load_config_from};

fn main() -> Result<()> {
    color_eyre::install()?;

    let config = match std::env::var_os("ANNODEMO_CONFIG") {
        Some(path) => load_config_from(std::path::Path::new(&path))?,
        None => load_config()?,
    };
    let registry = DatasetRegistry::from_config(&config)?;

    annodemo_tui::run(config, registry)
}
