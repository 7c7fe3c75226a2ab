//! File system paths for the pipeline.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Database filename under the data directory.
const DATABASE_NAME: &str = "beacon.sqlite";

/// Manages file system paths for the pipeline.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for configuration (~/.beacon)
    base_dir: PathBuf,
    /// Directory holding the event queue and identity files
    data_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance.
    ///
    /// Uses `~/.beacon` for configuration and the platform data directory
    /// (falling back to `~/.beacon/data`) for the queue and identities.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        let base_dir = home.join(".beacon");
        let data_dir = dirs::data_local_dir()
            .map(|dir| dir.join("beacon"))
            .unwrap_or_else(|| base_dir.join("data"));

        Ok(Self { base_dir, data_dir })
    }

    /// Create a new Paths instance rooted at a custom directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            data_dir: base_dir.join("data"),
            base_dir,
        }
    }

    /// Get the base directory (~/.beacon).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the data directory.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Get the config file path (~/.beacon/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the event queue database path.
    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join(DATABASE_NAME)
    }

    /// Get the identity file path for a project token.
    ///
    /// The token is reduced to filename-safe characters.
    pub fn identity_file(&self, token: &str) -> PathBuf {
        self.data_dir.join(format!("identity_{}.json", file_safe(token)))
    }

    /// Paths for a named dispatch context.
    ///
    /// Each context keeps its own queue and identities under
    /// `<data_dir>/contexts/<name>`; configuration stays shared.
    pub fn for_context(&self, context: &str) -> Paths {
        Paths {
            base_dir: self.base_dir.clone(),
            data_dir: self.data_dir.join("contexts").join(file_safe(context)),
        }
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Reduce a name to characters that are safe in a file name.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
