//! File system watcher for live rebuilds.
//!
//! Monitors the content, template and asset roots plus the config file and
//! triages every change batch into the cheapest sufficient rebuild.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    handle_changes()    │  │
//! │  │ events   │    │          │    │                        │  │
//! │  └──────────┘    └──────────┘    │  ┌──────────────────┐  │  │
//! │                                  │  │ Full Rebuild     │  │  │
//! │                                  │  │ (config/forced)  │  │  │
//! │                                  │  └──────────────────┘  │  │
//! │                                  │  ┌──────────────────┐  │  │
//! │                                  │  │ Incremental      │  │  │
//! │                                  │  │ (page/template/  │  │  │
//! │                                  │  │  asset)          │  │  │
//! │                                  │  └──────────────────┘  │  │
//! │                                  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::{
    build::{Site, build_site, render_all_pages},
    config::SiteConfig,
    log,
    logger::ProgressBars,
    render::assets::{copy_asset, copy_assets},
    render::{normalize_id, page::render_page},
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

const REBUILD_COOLDOWN_MS: u64 = 800;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Format path as relative to the project root for log display.
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Log a build failure with error details.
fn log_build_error(trigger: &str, err: &anyhow::Error) {
    if trigger.is_empty() {
        log!("error"; "build failed");
    } else {
        log!("error"; "build failed ({trigger})");
    }
    log!("error"; "{err:#}");
}

// =============================================================================
// Change Classification
// =============================================================================

/// Where a changed path falls in the project layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Content,
    Template,
    Asset,
    Config,
    Unknown,
}

/// Classify a changed path by the root that contains it.
pub fn classify(path: &Path, config: &SiteConfig) -> ChangeKind {
    if path == config.config_path {
        ChangeKind::Config
    } else if path.starts_with(&config.build.content) {
        ChangeKind::Content
    } else if path.starts_with(&config.build.templates) {
        ChangeKind::Template
    } else if path.starts_with(&config.build.assets) {
        ChangeKind::Asset
    } else {
        ChangeKind::Unknown
    }
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events with debouncing and rebuild cooldown.
///
/// A second save landing inside one debounce window is a double save,
/// and file creation or removal changes what pages exist. Both escalate
/// the batch to a full rebuild.
pub struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
    force_full: bool,
    window: Duration,
}

impl Debouncer {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            last_rebuild: None,
            force_full: false,
            window: Duration::from_millis(config.watch.debounce_ms),
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rebuild
            .is_some_and(|t| t.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS))
    }

    pub fn add(&mut self, event: Event) {
        let paths: Vec<PathBuf> = event
            .paths
            .into_iter()
            .filter(|path| !is_temp_file(path))
            .collect();
        if paths.is_empty() {
            return;
        }

        if matches!(event.kind, EventKind::Create(_) | EventKind::Remove(_)) {
            self.force_full = true;
        }
        // a second save landing inside the window escalates the whole batch
        if self.last_event.is_some_and(|t| t.elapsed() < self.window) {
            self.force_full = true;
        }
        self.pending.extend(paths);
        self.last_event = Some(Instant::now());
    }

    pub fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self.last_event.is_some_and(|t| t.elapsed() >= self.window)
    }

    /// Drain the batch, returning the paths and whether a full rebuild was
    /// forced.
    pub fn take(&mut self) -> (Vec<PathBuf>, bool) {
        self.last_event = None;
        let force_full = std::mem::take(&mut self.force_full);
        (self.pending.drain().collect(), force_full)
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            self.window
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Attempt a full site rebuild, logging errors on failure.
/// Returns true if successful (for cooldown tracking).
fn try_full_rebuild(site: &Site<'_>, reason: &str) -> bool {
    log!("watch"; "{reason}");
    match build_site(site) {
        Ok(()) => true,
        Err(e) => {
            log_build_error("", &e);
            false
        }
    }
}

/// Process file changes. Returns true if full rebuild succeeded (for cooldown).
pub fn handle_changes(site: &Site<'_>, paths: &[PathBuf], force_full: bool) -> bool {
    if paths.is_empty() {
        return false;
    }

    let config = site.config;
    let root = config.get_root();

    let mut content_changes: Vec<&PathBuf> = Vec::new();
    let mut template_changes: Vec<&PathBuf> = Vec::new();
    let mut asset_changes: Vec<&PathBuf> = Vec::new();
    let mut config_changed = false;

    for path in paths {
        match classify(path, config) {
            ChangeKind::Config => config_changed = true,
            ChangeKind::Content => content_changes.push(path),
            ChangeKind::Template => template_changes.push(path),
            ChangeKind::Asset => asset_changes.push(path),
            ChangeKind::Unknown => {}
        }
    }

    if config_changed {
        return try_full_rebuild(site, "config changed, rebuilding...");
    }

    if force_full {
        let mut rebuilt = false;
        if !(content_changes.is_empty() && template_changes.is_empty()) {
            // the full build re-copies the asset tree as well
            rebuilt = try_full_rebuild(site, "files added, removed or double-saved, rebuilding...");
        } else if !asset_changes.is_empty() {
            match copy_assets(config) {
                Ok(copied) => log!("watch"; "assets changed, re-copied {copied} file(s)"),
                Err(e) => log_build_error("assets", &e),
            }
        }
        return rebuilt;
    }

    for path in &asset_changes {
        if let Err(e) = copy_asset(path, config) {
            log_build_error(&rel_path(path, root), &e);
        }
    }

    if !template_changes.is_empty() {
        handle_template_changes(site, &template_changes);
    }

    for path in &content_changes {
        if handle_content_change(site, path) {
            return true;
        }
    }

    false
}

/// Re-render exactly the pages registered under the changed layouts.
fn handle_template_changes(site: &Site<'_>, paths: &[&PathBuf]) {
    let config = site.config;
    if let Err(e) = site.engine.reload() {
        log_build_error("template reload", &e.into());
        return;
    }

    for path in paths {
        let Ok(rel) = path.strip_prefix(&config.build.templates) else {
            continue;
        };
        let layout = normalize_id(&rel.to_string_lossy());
        let Some(layout) = layout.strip_suffix(".html") else {
            continue;
        };

        let version = site.layouts.invalidate(layout);
        let pages = site.layouts.pages_for(layout);
        if pages.is_empty() {
            log!("watch"; "layout {layout} changed (v{version}), no pages use it");
            continue;
        }

        log!("watch"; "layout {layout} changed (v{version}), re-rendering {} page(s)", pages.len());
        let progress = ProgressBars::new_filtered(&[("content", pages.len())]);
        let result = render_all_pages(site, &pages, || {
            if let Some(bars) = &progress {
                bars.inc_by_name("content");
            }
        });
        drop(progress);
        if let Err(e) = result {
            log_build_error(layout, &e);
        }
    }
}

/// Re-render the single page that owns a changed content file.
///
/// A file whose directory has no index file does not belong to any known
/// page, so the change falls back to a full rebuild. Returns true when
/// that full rebuild succeeded.
fn handle_content_change(site: &Site<'_>, path: &Path) -> bool {
    let config = site.config;
    let root = config.get_root();

    let Ok(rel) = path.strip_prefix(&config.build.content) else {
        return false;
    };
    let rel = normalize_id(&rel.to_string_lossy());
    let page = match rel.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => config.build.homepage.clone(),
    };

    if !config.index_file(&page).is_file() {
        return try_full_rebuild(
            site,
            &format!("{rel} changed but {page} has no index file, rebuilding..."),
        );
    }

    log!("watch"; "{rel}");
    match render_page(site, &page) {
        Ok(output) => {
            log!("watch"; "wrote {}", rel_path(&output, root));
        }
        Err(e) => log_build_error(&rel, &e),
    }
    false
}

// =============================================================================
// Watcher Setup
// =============================================================================

/// Log watched paths relative to the project root.
fn log_watch_summary(config: &SiteConfig) {
    let root = config.get_root();
    let watched: Vec<_> = [
        (&config.build.content, true),
        (&config.build.templates, true),
        (&config.build.assets, true),
        (&config.config_path, false),
    ]
    .into_iter()
    .filter(|(p, _)| p.exists())
    .map(|(p, is_dir)| {
        let rel = p.strip_prefix(root).unwrap_or(p);
        let suffix = if is_dir { "/" } else { "" };
        format!("{}{suffix}", rel.display())
    })
    .collect();

    if !watched.is_empty() {
        log!("watch"; "watching: {}", watched.join(", "));
    }
}

fn setup_watchers(watcher: &mut impl Watcher, config: &SiteConfig) -> Result<()> {
    let dirs = [
        &config.build.content,
        &config.build.templates,
        &config.build.assets,
    ];
    for dir in dirs {
        if dir.is_dir() {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
        }
    }
    if config.config_path.is_file() {
        watcher
            .watch(&config.config_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", config.config_path.display()))?;
    }

    log_watch_summary(config);
    eprintln!(); // Blank line to separate init logs from change events
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and live rebuild.
pub fn watch_for_changes_blocking(site: &Site<'_>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, site.config)?;

    let mut debouncer = Debouncer::new(site.config);

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => {
                debouncer.add(event);
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            // the cooldown after a full rebuild delays dispatch; events
            // keep collecting and go out once it expires
            Err(std::sync::mpsc::RecvTimeoutError::Timeout)
                if debouncer.ready() && !debouncer.in_cooldown() =>
            {
                let (paths, force_full) = debouncer.take();
                if handle_changes(site, &paths, force_full) {
                    debouncer.mark_rebuild();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            // Other cases: irrelevant events, timeout without ready, etc.
            _ => {}
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
