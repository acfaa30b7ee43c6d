//! Site initialization module.
//!
//! Creates new site structure with default configuration and a small
//! example page so the first build produces output.

use crate::config::SiteConfig;
use crate::log;
use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

/// Files to write ignore patterns to
const IGNORE_FILES: &[&str] = &[".gitignore", ".ignore"];

/// Default config filename
const CONFIG_FILE: &str = "sepia.toml";

/// Default site directory structure
const SITE_DIRS: &[&str] = &[
    "content/index",
    "content/index/partials",
    "assets/css",
    "templates",
];

const DEFAULT_INDEX: &str = "\
title: Welcome
main:
  - /index/partials/hello.md
";

const DEFAULT_PARTIAL: &str = "\
---
headline: Hello
---
Edit `content/index/index.yml` to change this page.
";

const DEFAULT_PAGE_TEMPLATE: &str = r#"<html>
<head>
  <title>{{ title }}</title>
</head>
<body>
{% for item in main %}{{ item | safe }}{% endfor %}
</body>
</html>
"#;

const DEFAULT_PARTIAL_TEMPLATE: &str = r#"<section>
<h2>{{ headline }}</h2>
{{ _body | safe }}
</section>
"#;

/// Create a new site with default structure
pub fn new_site(config: &'static SiteConfig, has_name: bool) -> Result<()> {
    let root = config.get_root();

    // Safety check: if no name was provided (init in current dir),
    // the directory must be completely empty
    if !has_name && !is_dir_empty(root)? {
        bail!(
            "Current directory is not empty. Use `sepia init <SITE_NAME>` to create in a subdirectory."
        );
    }

    init_site_structure(root)?;
    init_default_config(root)?;
    init_example_content(root)?;
    init_ignored_files(root, &[Path::new("site/")])?;

    log!("init"; "created site at {}", root.display());
    Ok(())
}

/// Check if a directory is completely empty
fn is_dir_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Write default configuration file
fn init_default_config(root: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&SiteConfig::default())?;
    fs::write(root.join(CONFIG_FILE), content)?;
    Ok(())
}

/// Create site directory structure
fn init_site_structure(root: &Path) -> Result<()> {
    for dir in SITE_DIRS {
        let path = root.join(dir);
        if path.exists() {
            bail!(
                "Path `{}` already exists. Try `sepia init <SITE_NAME>` instead.",
                path.display()
            );
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

/// Write the starter homepage, partial and templates
fn init_example_content(root: &Path) -> Result<()> {
    fs::write(root.join("content/index/index.yml"), DEFAULT_INDEX)?;
    fs::write(
        root.join("content/index/partials/hello.md"),
        DEFAULT_PARTIAL,
    )?;
    fs::write(root.join("templates/page.html"), DEFAULT_PAGE_TEMPLATE)?;
    fs::write(root.join("templates/partial.html"), DEFAULT_PARTIAL_TEMPLATE)?;
    Ok(())
}

/// Initialize .gitignore and .ignore files with specified paths
fn init_ignored_files(root: &Path, paths: &[&Path]) -> Result<()> {
    let content = paths
        .iter()
        .filter_map(|p| p.to_str())
        .collect::<Vec<_>>()
        .join("\n");

    for filename in IGNORE_FILES {
        let path = root.join(filename);
        if !path.exists() {
            fs::write(&path, &content)?;
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_dir_empty() {
        let dir = TempDir::new().unwrap();
        assert!(is_dir_empty(dir.path()).unwrap());
        assert!(is_dir_empty(&dir.path().join("missing")).unwrap());
        fs::write(dir.path().join("x"), "x").unwrap();
        assert!(!is_dir_empty(dir.path()).unwrap());
    }

    #[test]
    fn test_init_site_structure_refuses_existing() {
        let dir = TempDir::new().unwrap();
        init_site_structure(dir.path()).unwrap();
        assert!(init_site_structure(dir.path()).is_err());
    }

    #[test]
    fn test_init_default_config_roundtrips() {
        let dir = TempDir::new().unwrap();
        init_default_config(dir.path()).unwrap();
        let written = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        let parsed = SiteConfig::from_str(&written).unwrap();
        assert_eq!(parsed.site.title, SiteConfig::default().site.title);
    }
}
