//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Nothing in it can change
//! while the server runs; restart to pick up edits.
//!
//! # Root folder priority
//!
//! 1. Command-line argument (`--root-folder`)
//! 2. Environment variable (`TXDATA_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "TXDATA_ROOT_FOLDER";

/// Environment variable naming the TOML config file
pub const CONFIG_FILE_ENV: &str = "TXDATA_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "txdata.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Root folder for the database and workspaces (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Login session lifetimes
    #[serde(default)]
    pub session: SessionConfig,

    /// Encoder prototypes seeded at startup
    #[serde(default)]
    pub prototypes: Vec<PrototypeSeed>,

    /// Tutorial content tree (`[[levels]]`)
    #[serde(default)]
    pub levels: Vec<TutorialLevelSeed>,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Session token lifetimes in hours
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,

    /// Lifetime when the user asked to be remembered
    #[serde(default = "default_remember_ttl_hours")]
    pub remember_ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            remember_ttl_hours: default_remember_ttl_hours(),
        }
    }
}

/// One encoder prototype entry (`[[prototypes]]`)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PrototypeSeed {
    pub name: String,
    pub encoder_type: String,
    #[serde(default)]
    pub description: String,
}

/// Tutorial level with its nested sections
#[derive(Debug, Clone, Deserialize)]
pub struct TutorialLevelSeed {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sections: Vec<TutorialSectionSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TutorialSectionSeed {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<TutorialTopicSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TutorialTopicSeed {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subtopics: Vec<TutorialSubtopicSeed>,
}

/// Leaf tutorial page
///
/// `examples` may be a list, a table or a plain value; it is normalized to a
/// JSON object when seeded.
#[derive(Debug, Clone, Deserialize)]
pub struct TutorialSubtopicSeed {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub video_link: Option<String>,
    #[serde(default)]
    pub examples: Option<serde_json::Value>,
    #[serde(default)]
    pub images: Option<serde_json::Value>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl_hours() -> i64 {
    12
}

fn default_remember_ttl_hours() -> i64 {
    24 * 30
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a file
    ///
    /// A missing file is not an error: a warning is logged and defaults are
    /// returned. A file that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file not found at {} - using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Prototypes from the file, or the built-in set when the file lists none
    pub fn prototypes_or_default(&self) -> Vec<PrototypeSeed> {
        if self.prototypes.is_empty() {
            default_prototypes()
        } else {
            self.prototypes.clone()
        }
    }
}

/// Built-in encoder prototypes, one per encoder type
pub fn default_prototypes() -> Vec<PrototypeSeed> {
    [
        ("5-Point Likert", "Likert", "Agreement or frequency scale mapped to ordered numeric codes"),
        ("Ordered Categories", "Ordinal", "Categories coded by their position in an ordered list"),
        ("Yes/No Binary", "Binary", "Yes/True answers coded 1, everything else 0"),
        ("Nominal Categories", "Nominal", "Unordered categories factorized to integer codes"),
        ("Multi-Select", "NominalMulti", "Comma-separated selections expanded to one 0/1 column per category"),
    ]
    .into_iter()
    .map(|(name, encoder_type, description)| PrototypeSeed {
        name: name.to_string(),
        encoder_type: encoder_type.to_string(),
        description: description.to_string(),
    })
    .collect()
}

/// Resolve the TOML config file path
///
/// Priority: CLI argument, then `TXDATA_CONFIG`, then
/// `<config_dir>/txdata/config.toml`.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::config_dir()
        .map(|d| d.join("txdata").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Root folder resolver following the CLI → env → TOML → default order
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_value: config.root_folder.clone(),
        }
    }

    /// Resolve the root folder; never fails
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("txdata"))
        .unwrap_or_else(|| PathBuf::from("./txdata_data"))
}

/// Creates the root folder layout and derives paths inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root, project and workspace directories when missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
        }
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.projects_path())?;
        std::fs::create_dir_all(self.workspace_path())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    /// Persistent project files (uploads and generated artifacts)
    pub fn projects_path(&self) -> PathBuf {
        self.root_folder.join("projects")
    }

    /// Temporary per-session cache, cleared at logout
    pub fn workspace_path(&self) -> PathBuf {
        self.root_folder.join("workspaces")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 5740);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.session.ttl_hours, 12);
        assert!(config.prototypes.is_empty());
        assert_eq!(config.prototypes_or_default().len(), 5);
    }

    #[test]
    fn test_prototypes_and_levels_parse() {
        let content = r#"
            root_folder = "/srv/txdata"

            [[prototypes]]
            name = "Agreement"
            encoder_type = "Likert"
            description = "SA..SD"

            [[levels]]
            title = "Beginner"

            [[levels.sections]]
            title = "Descriptives"

            [[levels.sections.topics]]
            title = "Central tendency"

            [[levels.sections.topics.subtopics]]
            title = "Mean"
            definition = "Sum divided by count"
            examples = ["1, 2, 3 -> 2"]
        "#;
        let config = TomlConfig::from_toml_str(content).unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/txdata")));
        assert_eq!(config.prototypes_or_default().len(), 1);
        assert_eq!(config.prototypes[0].encoder_type, "Likert");

        let subtopic = &config.levels[0].sections[0].topics[0].subtopics[0];
        assert_eq!(subtopic.title, "Mean");
        assert!(subtopic.examples.as_ref().unwrap().is_array());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("server = [").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let config = TomlConfig::load(Path::new("/nonexistent/txdata/config.toml")).unwrap();
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/data/tx"));
        assert_eq!(init.database_path(), PathBuf::from("/data/tx/txdata.db"));
        assert_eq!(init.projects_path(), PathBuf::from("/data/tx/projects"));
        assert_eq!(init.workspace_path(), PathBuf::from("/data/tx/workspaces"));
    }
}
