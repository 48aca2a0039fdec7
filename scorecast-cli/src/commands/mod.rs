//! CLI command implementations

mod composite;
mod config;
mod info;
mod record;

pub use composite::{composite, CompositeArgs};
pub use config::{config, ConfigArgs};
pub use info::{info, InfoArgs};
pub use record::{record, RecordArgs};

use anyhow::Result;
use scorecast_core::config::{ConfigFile, RecorderConfig};
use scorecast_core::media::{self, MediaBackend};
use std::path::PathBuf;
use std::sync::Arc;

/// Load the recorder configuration from `path` or the default location
pub(crate) fn load_config(path: Option<PathBuf>) -> Result<RecorderConfig> {
    let file = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(file.recorder)
}

/// The compiled-in media backend, with a hint when there is none
pub(crate) fn backend() -> Result<Arc<dyn MediaBackend>> {
    media::default_backend().map_err(|e| match e.user_hint() {
        Some(hint) => anyhow::anyhow!("{}\n  hint: {}", e, hint),
        None => anyhow::anyhow!("{}", e),
    })
}
