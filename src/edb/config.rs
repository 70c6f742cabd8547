//! Handler configuration.
//!
//! ```toml
//! root = "/var/lib/edb"
//! create_if_missing = true
//! commit_message = "commit via EDB-API"
//!
//! [committer]
//! name = "EDB"
//! email = "edb@localhost"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::edb::error::{EdbError, EdbResult};
use crate::storage::{CommitMessage, GitSignature};

/// directory of the content repository below the root
pub const DATA_DIR: &str = "data";

/// directory of the index repository below the root
pub const INDEX_DIR: &str = "index";

/// Handler configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdbConfig {
    /// Root directory holding the data and index repositories.
    pub root: PathBuf,
    /// Create the repositories if they don't exist.
    pub create_if_missing: bool,
    /// Committer identity of every revision.
    pub committer: GitSignature,
    /// Message of handler commits.
    pub commit_message: String,
}

impl Default for EdbConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".edb"),
            create_if_missing: true,
            committer: GitSignature::edb(),
            commit_message: CommitMessage::DEFAULT.to_string(),
        }
    }
}

impl EdbConfig {
    /// Create a new configuration with the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Read a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> EdbResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| EdbError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse a TOML configuration.
    pub fn from_toml_str(text: &str) -> EdbResult<Self> {
        let config: EdbConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set the committer identity.
    pub fn committer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.committer = GitSignature::new(name, email);
        self
    }

    /// Set the commit message.
    pub fn commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    pub fn validate(&self) -> EdbResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(EdbError::InvalidConfig("root must not be empty".into()));
        }
        if self.commit_message.trim().is_empty() {
            return Err(EdbError::InvalidConfig("commit_message must not be empty".into()));
        }
        if self.committer.name.is_empty() || self.committer.email.is_empty() {
            return Err(EdbError::InvalidConfig("committer needs a name and an email".into()));
        }
        Ok(())
    }

    /// The root as an absolute path; relative roots are taken from the current directory.
    pub fn resolved_root(&self) -> EdbResult<PathBuf> {
        if self.root.is_absolute() {
            Ok(self.root.clone())
        } else {
            Ok(std::env::current_dir()?.join(&self.root))
        }
    }

    pub fn data_dir(&self) -> EdbResult<PathBuf> {
        Ok(self.resolved_root()?.join(DATA_DIR))
    }

    pub fn index_dir(&self) -> EdbResult<PathBuf> {
        Ok(self.resolved_root()?.join(INDEX_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EdbConfig::default();
        assert!(config.create_if_missing);
        assert_eq!(config.commit_message, "commit via EDB-API");
        assert_eq!(config.committer, GitSignature::edb());
    }

    #[test]
    fn test_from_toml() {
        let config = EdbConfig::from_toml_str(
            r#"
            root = "/srv/edb"
            create_if_missing = false

            [committer]
            name = "bot"
            email = "bot@x.org"
            "#,
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/edb"));
        assert!(!config.create_if_missing);
        assert_eq!(config.committer, GitSignature::new("bot", "bot@x.org"));
        assert_eq!(config.commit_message, CommitMessage::DEFAULT);
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/srv/edb/data"));
        assert_eq!(config.index_dir().unwrap(), PathBuf::from("/srv/edb/index"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            EdbConfig::from_toml_str("root = ["),
            Err(EdbError::ConfigParse(_))
        ));
        assert!(matches!(
            EdbConfig::from_toml_str("commit_message = \"  \""),
            Err(EdbError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_relative_root_is_resolved() {
        let config = EdbConfig::new("relative/edb");
        let root = config.resolved_root().unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("relative/edb"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = EdbConfig::load(dir.path().join("edb.toml"));
        assert!(matches!(result, Err(EdbError::ConfigFile { .. })));
    }

    #[test]
    fn test_builder() {
        let config = EdbConfig::new("/x")
            .create_if_missing(false)
            .committer("a", "a@x")
            .commit_message("m");
        assert!(!config.create_if_missing);
        assert_eq!(config.committer.name, "a");
        assert_eq!(config.commit_message, "m");
    }
}
