//! Config loader facade: composes defaults and file sources.

use crate::config::merge_policy::builder_with_defaults;
use crate::config::sources::{global_file, workspace_file};
use crate::config::ReclaimConfig;
use crate::error::EngineError;
use config::File;
use std::path::Path;
use tracing::debug;

/// Loads [`ReclaimConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, then the global file, then workspace files under
    /// `workspace_root/config`.
    pub fn load(workspace_root: &Path) -> Result<ReclaimConfig, EngineError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config: ReclaimConfig = builder.build()?.try_deserialize()?;
        config.ensure_valid()?;
        debug!(workspace = %workspace_root.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Load defaults plus a single explicit file, which must exist.
    pub fn load_from_file(path: &Path) -> Result<ReclaimConfig, EngineError> {
        let config: ReclaimConfig = builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        config.ensure_valid()?;
        Ok(config)
    }
}
