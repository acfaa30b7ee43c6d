//! Site configuration management for `sepia.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                        |
//! |-------------|------------------------------------------------|
//! | `[site]`    | Site metadata (title, root URL, doctype)       |
//! | `[build]`   | Build paths and index/homepage naming          |
//! | `[layouts]` | Default layouts for pages and partials         |
//! | `[watch]`   | Debounce window for the file watcher           |
//! | `[extra]`   | User-defined custom fields, exposed to layouts |
//!
//! # Example
//!
//! ```toml
//! [site]
//! title = "My Site"
//! root = "/"
//!
//! [build]
//! content = "content"
//! templates = "templates"
//! output = "site"
//!
//! [layouts]
//! page = "page"
//!
//! [watch]
//! debounce_ms = 400
//! ```

mod error;

pub use error::ConfigError;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Build Profile
// ============================================================================

/// Error posture for a build run.
///
/// `Dev` recovers from parse errors by substituting empty frontmatter and
/// logging; `Production` escalates any parse or render failure so broken
/// output never ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Dev,
    Production,
}

impl Profile {
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing sepia.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// CLI arguments reference
    #[serde(skip)]
    pub cli: Option<&'static Cli>,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Error posture (set from CLI, not the config file)
    #[serde(skip)]
    pub profile: Profile,

    /// Basic site information
    #[serde(default)]
    pub site: SiteSection,

    /// Build settings
    #[serde(default)]
    pub build: BuildSection,

    /// Default layouts
    #[serde(default)]
    pub layouts: LayoutsSection,

    /// File watcher settings
    #[serde(default)]
    pub watch: WatchSection,

    /// User-defined extra fields
    #[serde(default)]
    pub extra: HashMap<String, toml::Value>,
}

/// Basic site information
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSection {
    /// Site title
    pub title: String,

    /// URL root all page URLs hang off, must end with `/`
    #[educe(Default(expression = "/".to_string()))]
    pub root: String,

    /// Doctype prepended to every rendered page
    #[educe(Default(expression = "<!DOCTYPE html>".to_string()))]
    pub doctype: String,
}

/// Build paths and naming
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    /// Project root directory (set from CLI)
    #[serde(skip)]
    pub root: Option<PathBuf>,

    /// Content directory, one sub-directory per page
    #[educe(Default(expression = PathBuf::from("content")))]
    pub content: PathBuf,

    /// Template directory, one file per layout
    #[educe(Default(expression = PathBuf::from("templates")))]
    pub templates: PathBuf,

    /// Asset directory, copied verbatim into the output
    #[educe(Default(expression = PathBuf::from("assets")))]
    pub assets: PathBuf,

    /// Output directory for the rendered site
    #[educe(Default(expression = PathBuf::from("site")))]
    pub output: PathBuf,

    /// File stem of the page index file (`<page>/<index>.yml`)
    #[educe(Default(expression = "index".to_string()))]
    pub index: String,

    /// Page ID of the homepage
    #[educe(Default(expression = "index".to_string()))]
    pub homepage: String,

    /// Clean output directory completely before building
    pub clean: bool,
}

/// Default layouts assigned when frontmatter has none
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutsSection {
    /// Layout for full pages (`.yml` index files)
    #[educe(Default(expression = "page".to_string()))]
    pub page: String,

    /// Layout for partial fragments (`.md` files)
    #[educe(Default(expression = "partial".to_string()))]
    pub partial: String,
}

/// File watcher settings
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSection {
    /// Debounce window in milliseconds; events closer together than this
    /// are coalesced into one rebuild decision
    #[educe(Default(expression = 400))]
    pub debounce_ms: u64,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path and re-anchor all build paths under it
    pub fn set_root(&mut self, path: &Path) {
        let root = normalize_path(path);
        self.build.content = normalize_path(&root.join(&self.build.content));
        self.build.templates = normalize_path(&root.join(&self.build.templates));
        self.build.assets = normalize_path(&root.join(&self.build.assets));
        self.build.output = normalize_path(&root.join(&self.build.output));
        self.config_path = normalize_path(&root.join(
            self.cli.map_or(Path::new("sepia.toml"), |cli| cli.config.as_path()),
        ));
        self.build.root = Some(root);
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &'static Cli) {
        self.cli = Some(cli);

        // Determine the final root path based on command
        let root = match &cli.command {
            Commands::Init { name: Some(name) } => {
                let base = cli
                    .root
                    .as_ref()
                    .cloned()
                    .unwrap_or_else(|| self.get_root().to_owned());
                base.join(name)
            }
            _ => cli
                .root
                .as_ref()
                .cloned()
                .unwrap_or_else(|| self.get_root().to_owned()),
        };

        self.set_root(&root);

        if let Some(args) = cli.build_args() {
            self.build.clean = args.clean;
            if args.production {
                self.profile = Profile::Production;
            }
        }
    }

    /// Validate configuration for the current command
    pub fn validate(&self) -> Result<()> {
        if !self.config_path.exists() {
            bail!("Config file not found");
        }

        if !self.site.root.ends_with('/') {
            bail!(ConfigError::Validation(
                "[site.root] must end with `/`".into()
            ));
        }

        if !self.build.content.exists() {
            bail!(ConfigError::Validation(format!(
                "[build.content] not found: {}",
                self.build.content.display()
            )));
        }

        if !self.build.templates.exists() {
            bail!(ConfigError::Validation(format!(
                "[build.templates] not found: {}",
                self.build.templates.display()
            )));
        }

        if self.build.index.is_empty() || self.build.homepage.is_empty() {
            bail!(ConfigError::Validation(
                "[build.index] and [build.homepage] must not be empty".into()
            ));
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Derived paths and IDs
    // ------------------------------------------------------------------------

    /// Content-relative file ID of a page's index file, e.g. `blog/index.yml`
    pub fn index_id(&self, page: &str) -> String {
        format!("{page}/{}.yml", self.build.index)
    }

    /// Absolute path of a page's index file
    pub fn index_file(&self, page: &str) -> PathBuf {
        self.build.content.join(self.index_id(page))
    }

    /// Output file of a page, mirroring the content tree
    pub fn output_file(&self, page: &str) -> PathBuf {
        if page == self.build.homepage {
            self.build.output.join("index.html")
        } else {
            self.build.output.join(page).join("index.html")
        }
    }

    /// Output directory the asset root is copied into
    pub fn assets_output(&self) -> PathBuf {
        let name = self
            .build
            .assets
            .file_name()
            .unwrap_or_else(|| "assets".as_ref());
        self.build.output.join(name)
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        // For non-existent paths, manually make them absolute
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SiteConfig::default();
        assert_eq!(config.site.root, "/");
        assert_eq!(config.build.index, "index");
        assert_eq!(config.build.homepage, "index");
        assert_eq!(config.layouts.page, "page");
        assert_eq!(config.layouts.partial, "partial");
        assert_eq!(config.watch.debounce_ms, 400);
        assert!(!config.profile.is_production());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = SiteConfig::from_str(
            r#"
[site]
title = "Test"
root = "/sub/"

[watch]
debounce_ms = 100
"#,
        )
        .unwrap();
        assert_eq!(config.site.title, "Test");
        assert_eq!(config.site.root, "/sub/");
        assert_eq!(config.watch.debounce_ms, 100);
        // untouched sections keep their defaults
        assert_eq!(config.build.content, PathBuf::from("content"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(SiteConfig::from_str("[site]\nbogus = 1\n").is_err());
    }

    #[test]
    fn test_index_id() {
        let config = SiteConfig::default();
        assert_eq!(config.index_id("blog"), "blog/index.yml");
    }

    #[test]
    fn test_output_file() {
        let mut config = SiteConfig::default();
        config.build.output = PathBuf::from("/out");
        assert_eq!(config.output_file("index"), PathBuf::from("/out/index.html"));
        assert_eq!(
            config.output_file("blog"),
            PathBuf::from("/out/blog/index.html")
        );
    }

    #[test]
    fn test_roundtrip_serialization() {
        let config = SiteConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = SiteConfig::from_str(&toml_str).unwrap();
        assert_eq!(parsed.site.root, config.site.root);
        assert_eq!(parsed.build.homepage, config.build.homepage);
    }
}
