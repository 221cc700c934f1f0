use schemars::{JsonSchema, schema_for};
use tracing::info;

use crate::utils::{self, errors::EmptyResult};

pub struct SchemaGen {}

impl SchemaGen {
    pub fn new() -> Self {
        Self {}
    }

    pub fn execute(&self) -> EmptyResult {
        self.generate_single::<crate::models::config::Config>("rigup.schema.json")?;
        Ok(())
    }

    /// Generic JSON schema generator; writes next to the config file so
    /// editors can pick it up.
    fn generate_single<T>(&self, file_name: &str) -> EmptyResult
    where
        T: JsonSchema,
    {
        let schema = schema_for!(T);
        let schema_str = serde_json::to_string_pretty(&schema)?;

        let path = utils::dir::DirUtils::curr_dir()?.join(file_name);
        std::fs::write(&path, schema_str)?;

        info!("✅ Schema generated successfully at {}", path.display());
        Ok(())
    }
}
