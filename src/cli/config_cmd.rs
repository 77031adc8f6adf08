//! `loofinder config` command handlers.

use anyhow::Result;

use loofinder::config::Config;

use super::ConfigAction;

pub(crate) fn cmd_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
            println!();
            println!("Store directory: {}", config.storage_dir().display());
        }
        ConfigAction::Path => {
            println!("{}", Config::path().display());
        }
    }
    Ok(())
}
