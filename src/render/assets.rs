//! Copying the asset root into the output.

use crate::config::SiteConfig;
use crate::log;
use anyhow::Result;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Copy every file under the asset root into the output, preserving the
/// directory layout. Files whose destination is already newer are skipped.
pub fn copy_assets(config: &SiteConfig) -> Result<usize> {
    let assets = &config.build.assets;
    if !assets.is_dir() {
        return Ok(0);
    }

    let output = config.assets_output();
    let mut copied = 0;
    for entry in WalkDir::new(assets).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(assets)?;
        let dest = output.join(rel);
        if is_up_to_date(entry.path(), &dest) {
            continue;
        }

        log!("assets"; "{}", rel.display());
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &dest)?;
        copied += 1;
    }
    Ok(copied)
}

/// Copy a single asset file, given its path under the asset root.
///
/// Called for watch events, which already prove the file changed, so no
/// mtime comparison: coarse filesystem timestamps can tie even when the
/// content differs.
pub fn copy_asset(path: &Path, config: &SiteConfig) -> Result<()> {
    let rel = path.strip_prefix(&config.build.assets)?;
    let dest = config.assets_output().join(rel);

    log!("assets"; "{}", rel.display());
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(path, dest)?;
    Ok(())
}

fn is_up_to_date(src: &Path, dst: &Path) -> bool {
    let Ok(src_meta) = src.metadata() else {
        return false;
    };
    let Ok(dst_meta) = dst.metadata() else {
        return false;
    };
    let (Ok(src_time), Ok(dst_time)) = (src_meta.modified(), dst_meta.modified()) else {
        return false;
    };
    src_time <= dst_time
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> SiteConfig {
        let mut config = SiteConfig::default();
        config.set_root(dir.path());
        config
    }

    #[test]
    fn test_copy_assets_preserves_layout() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::create_dir_all(config.build.assets.join("css")).unwrap();
        fs::write(config.build.assets.join("css/site.css"), "body{}").unwrap();
        fs::write(config.build.assets.join("logo.svg"), "<svg/>").unwrap();

        let copied = copy_assets(&config).unwrap();
        assert_eq!(copied, 2);
        let out = config.assets_output();
        assert_eq!(fs::read_to_string(out.join("css/site.css")).unwrap(), "body{}");
        assert_eq!(fs::read_to_string(out.join("logo.svg")).unwrap(), "<svg/>");
    }

    #[test]
    fn test_copy_assets_skips_up_to_date() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::create_dir_all(&config.build.assets).unwrap();
        fs::write(config.build.assets.join("a.txt"), "x").unwrap();

        assert_eq!(copy_assets(&config).unwrap(), 1);
        assert_eq!(copy_assets(&config).unwrap(), 0);
    }

    #[test]
    fn test_copy_asset_ignores_destination_mtime() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::create_dir_all(&config.build.assets).unwrap();
        let src = config.build.assets.join("site.css");
        fs::write(&src, "p{}").unwrap();

        // destination is newer than the source, but the event-driven copy
        // must still overwrite it
        let dest = config.assets_output().join("site.css");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "stale{}").unwrap();

        copy_asset(&src, &config).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "p{}");
    }

    #[test]
    fn test_copy_assets_missing_root_is_noop() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        assert_eq!(copy_assets(&config).unwrap(), 0);
    }
}
