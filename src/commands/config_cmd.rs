use clap::{Args, Subcommand, ValueEnum};

use loro_mirror::{ConfigValue, StoreConfig};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the default config file path
    Path,
}

impl ConfigCommand {
    pub fn run(&self, config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                StoreConfig::default_config_path().display()
                            );
                        }
                        println!();

                        print_value("validate_updates", &config.validate_updates);
                        print_value(
                            "throw_on_validation_error",
                            &config.throw_on_validation_error,
                        );
                        print_value("debug", &config.debug);
                        print_value("default_loro_text", &config.default_loro_text);
                    }
                }
                Ok(())
            }
            ConfigSubcommand::Path => {
                println!("{}", StoreConfig::default_config_path().display());
                Ok(())
            }
        }
    }
}

fn print_value(name: &str, value: &ConfigValue<bool>) {
    println!("{}: {}", name, value.value);
    println!("  source: {}", value.source);
    println!();
}
