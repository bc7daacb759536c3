//! Config command handlers.

use anyhow::Result;

use lolang_relay::config::Config;

use super::ConfigAction;

pub(crate) fn cmd_config(config: &Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check => {
            let config_path = Config::path();
            println!("Config file: {}", config_path.display());
            if !config_path.exists() {
                println!("[OK] No config file found (using defaults)");
            }

            let problems = config.validate();
            for problem in &problems {
                println!("[ERROR] {}", problem);
            }

            if problems.is_empty() {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} problem(s)", problems.len());
                anyhow::bail!("configuration is invalid");
            }
        }
        ConfigAction::Show => {
            println!("{:#?}", config);
        }
    }
    Ok(())
}
