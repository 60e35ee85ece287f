use clap::Args;
use std::path::PathBuf;

use loro::LoroDoc;
use loro_mirror::schema::{schema, SchemaType};
use loro_mirror_core::utils::value_type_name;
use loro_mirror::{create_store, StoreConfig, StoreOptions};

use super::config_cmd::OutputFormat;

/// Load a Loro snapshot or update file and print the mirrored state
#[derive(Args)]
pub struct InspectCommand {
    /// Snapshot or update file exported by Loro
    pub file: PathBuf,

    /// Output format
    #[arg(long, short, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

impl InspectCommand {
    pub fn run(&self, config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = std::fs::read(&self.file)?;
        let doc = LoroDoc::new();
        doc.import(&bytes)?;

        // Without a schema, every root is mirrored by inference.
        let root = schema(Vec::<(String, SchemaType)>::new());
        let store = create_store(StoreOptions::new(doc, root).with_config(config))?;
        let state = store.get_state();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(state)?),
            OutputFormat::Text => {
                let registry = store.mirror().registry();
                println!("File: {}", self.file.display());
                println!("Containers: {}", registry.len());
                if let Some(fields) = state.as_object() {
                    for (key, value) in fields {
                        println!("  {}: {}", key, value_type_name(value));
                    }
                }
            }
        }
        Ok(())
    }
}
