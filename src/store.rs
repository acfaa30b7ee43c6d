//! Shared build state: the page registry, the layout index and the
//! key/value store exposed to layouts.
//!
//! All three are append/merge-only maps keyed by ID. They are owned by the
//! [`crate::build::Site`] handle and passed by reference into renderer
//! calls, so repeated or concurrent builds (and tests) stay independent.

use crate::config::SiteConfig;
use crate::parse;
use crate::render::RenderError;
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Arc;

// ============================================================================
// PageRegistry
// ============================================================================

/// Accumulates every page's resolved frontmatter for cross-page lookup.
///
/// Pages are injected eagerly, before their partials are resolved, so a
/// partial rendered as a sibling-page reference can read another page's
/// already-injected frontmatter. Entries live until `clear()` at the next
/// full build.
#[derive(Debug, Default)]
pub struct PageRegistry {
    all: RwLock<BTreeMap<String, Map<String, Value>>>,
    /// `site.root` prefix for URL derivation
    site_root: String,
    /// Page ID of the homepage, which maps to the bare site root
    homepage: String,
}

impl PageRegistry {
    pub fn new(site_root: String, homepage: String) -> Self {
        Self {
            all: RwLock::default(),
            site_root,
            homepage,
        }
    }

    /// Snapshot of all known pages, ID to frontmatter.
    pub fn get(&self) -> BTreeMap<String, Value> {
        self.all
            .read()
            .iter()
            .map(|(id, data)| (id.clone(), Value::Object(data.clone())))
            .collect()
    }

    /// Snapshot as a single JSON mapping, for template context.
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.all
                .read()
                .iter()
                .map(|(id, data)| (id.clone(), Value::Object(data.clone())))
                .collect(),
        )
    }

    /// The URL a page ID always resolves to: `site.root + ID`, homepage
    /// maps to the root alone.
    pub fn url_for(&self, page: &str) -> String {
        if page == self.homepage {
            self.site_root.clone()
        } else {
            format!("{}{page}", self.site_root)
        }
    }

    /// Merge `data` over the stored frontmatter for `page` and re-assert
    /// the derived `_url`, which injected data can never shadow.
    ///
    /// The merge is shallow: top-level keys in `data` win. Injecting the
    /// same data twice leaves the entry unchanged.
    pub fn inject(&self, page: &str, data: &Value) -> Value {
        let mut all = self.all.write();
        let merged = all.entry(page.to_string()).or_default();
        if let Value::Object(map) = data {
            for (key, value) in map {
                merged.insert(key.clone(), value.clone());
            }
        }
        // added last so it can never be overwritten
        merged.insert("_url".to_string(), json!(self.url_for(page)));
        Value::Object(merged.clone())
    }

    /// Read one page's index file, parse it and inject its frontmatter.
    pub fn set(&self, page: &str, config: &SiteConfig) -> Result<Value, RenderError> {
        let path = config.index_file(page);
        let file = config.index_id(page);
        let content = fs::read_to_string(&path).map_err(|source| RenderError::Io {
            file: file.clone(),
            source,
        })?;
        let frontmatter = parse::parse_yaml(&content, &file, config.profile)?;
        Ok(self.inject(page, &frontmatter))
    }

    /// Fan `set` out over every page ID.
    ///
    /// All IDs are attempted; the error enumerates every ID that failed.
    pub fn set_all(&self, pages: &[String], config: &SiteConfig) -> anyhow::Result<()> {
        let failures: Vec<(String, RenderError)> = pages
            .par_iter()
            .filter_map(|page| {
                self.set(page, config)
                    .err()
                    .map(|err| (page.clone(), err))
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        let details: Vec<String> = failures
            .iter()
            .map(|(page, err)| format!("  {page}: {err}"))
            .collect();
        anyhow::bail!(
            "failed to read frontmatter for {} page(s):\n{}",
            failures.len(),
            details.join("\n")
        );
    }

    /// Drop all entries; called at the start of a full build.
    pub fn clear(&self) {
        self.all.write().clear();
    }

    pub fn len(&self) -> usize {
        self.all.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.read().is_empty()
    }
}

// ============================================================================
// LayoutIndex
// ============================================================================

/// Remembers which pages were rendered through which layout, answering
/// "if layout T changes, which pages must be rebuilt?".
///
/// Rebuilt from empty on every full build; never pruned incrementally. A
/// page that changes layouts leaves a stale entry under its old layout
/// until the next full build clears it.
#[derive(Debug, Default)]
pub struct LayoutIndex {
    all: RwLock<BTreeMap<String, BTreeSet<String>>>,
    /// Bumped on change notification instead of deleting engine state
    versions: RwLock<FxHashMap<String, u64>>,
}

impl LayoutIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the whole index, layout to page IDs.
    pub fn get(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.all.read().clone()
    }

    /// Record that `page` renders through `layout`. Idempotent: a page
    /// appearing twice under the same layout is a no-op.
    pub fn set(&self, page: &str, layout: &str) {
        self.all
            .write()
            .entry(layout.to_string())
            .or_default()
            .insert(page.to_string());
    }

    /// All pages currently known to use `layout`, sorted.
    pub fn pages_for(&self, layout: &str) -> Vec<String> {
        self.all
            .read()
            .get(layout)
            .map(|pages| pages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Bump the version of a changed layout, returning the new version.
    pub fn invalidate(&self, layout: &str) -> u64 {
        let mut versions = self.versions.write();
        let version = versions.entry(layout.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    /// Current version of a layout (0 when never invalidated).
    pub fn version(&self, layout: &str) -> u64 {
        self.versions.read().get(layout).copied().unwrap_or(0)
    }

    /// Drop all memberships and versions; called at the start of a full
    /// build so stale layout caches cannot survive.
    pub fn clear(&self) {
        self.all.write().clear();
        self.versions.write().clear();
    }

    pub fn len(&self) -> usize {
        self.all.read().len()
    }
}

// ============================================================================
// KvStore
// ============================================================================

/// Shared key/value store exposed to layouts via `store_get`/`store_set`.
///
/// Cheap to clone; clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct KvStore(Arc<RwLock<BTreeMap<String, Value>>>);

impl KvStore {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.0.write().insert(key.to_string(), value);
    }

    pub fn snapshot(&self) -> Value {
        Value::Object(self.0.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> PageRegistry {
        PageRegistry::new("/".to_string(), "index".to_string())
    }

    #[test]
    fn test_inject_derives_url() {
        let pages = registry();
        let page = pages.inject("blog", &json!({ "title": "Blog" }));
        assert_eq!(page["title"], json!("Blog"));
        assert_eq!(page["_url"], json!("/blog"));
    }

    #[test]
    fn test_homepage_url_is_bare_root() {
        let pages = registry();
        let page = pages.inject("index", &json!({}));
        assert_eq!(page["_url"], json!("/"));
    }

    #[test]
    fn test_url_cannot_be_shadowed() {
        let pages = registry();
        // frontmatter trying to smuggle in its own _url
        let page = pages.inject("blog", &json!({ "_url": "/evil" }));
        assert_eq!(page["_url"], json!("/blog"));

        // and again through a repeated merge
        let page = pages.inject("blog", &json!({ "_url": "/evil", "x": 1 }));
        assert_eq!(page["_url"], json!("/blog"));
        assert_eq!(page["x"], json!(1));
    }

    #[test]
    fn test_inject_merges_shallow() {
        let pages = registry();
        pages.inject("blog", &json!({ "a": 1, "nested": { "x": 1 } }));
        let page = pages.inject("blog", &json!({ "b": 2, "nested": { "y": 2 } }));
        assert_eq!(page["a"], json!(1));
        assert_eq!(page["b"], json!(2));
        // shallow merge: whole nested mapping is replaced, not deep-merged
        assert_eq!(page["nested"], json!({ "y": 2 }));
    }

    #[test]
    fn test_inject_idempotent_for_identical_input() {
        let pages = registry();
        let first = pages.inject("blog", &json!({ "title": "Blog" }));
        let second = pages.inject("blog", &json!({ "title": "Blog" }));
        assert_eq!(first, second);
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_non_object_injection_keeps_entry() {
        let pages = registry();
        let page = pages.inject("blog", &json!("just a string"));
        // nothing to merge, but the entry exists with its URL
        assert_eq!(page["_url"], json!("/blog"));
    }

    #[test]
    fn test_clear_empties_registry() {
        let pages = registry();
        pages.inject("blog", &json!({}));
        assert!(!pages.is_empty());
        pages.clear();
        assert!(pages.is_empty());
    }

    #[test]
    fn test_site_root_prefix() {
        let pages = PageRegistry::new("/sub/".to_string(), "index".to_string());
        assert_eq!(pages.url_for("blog"), "/sub/blog");
        assert_eq!(pages.url_for("index"), "/sub/");
    }

    #[test]
    fn test_layout_index_set_idempotent() {
        let layouts = LayoutIndex::new();
        layouts.set("blog", "page");
        layouts.set("blog", "page");
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts.pages_for("page"), vec!["blog".to_string()]);
    }

    #[test]
    fn test_layout_index_tracks_multiple_pages() {
        let layouts = LayoutIndex::new();
        layouts.set("blog", "page");
        layouts.set("index", "page");
        layouts.set("blog", "hero");
        let all = layouts.get();
        assert_eq!(all["page"].len(), 2);
        assert_eq!(all["hero"].len(), 1);
    }

    #[test]
    fn test_layout_index_unknown_layout_is_empty() {
        let layouts = LayoutIndex::new();
        assert!(layouts.pages_for("ghost").is_empty());
    }

    #[test]
    fn test_layout_versions() {
        let layouts = LayoutIndex::new();
        assert_eq!(layouts.version("page"), 0);
        assert_eq!(layouts.invalidate("page"), 1);
        assert_eq!(layouts.invalidate("page"), 2);
        assert_eq!(layouts.version("page"), 2);
        layouts.clear();
        assert_eq!(layouts.version("page"), 0);
    }

    #[test]
    fn test_kv_store_shared_between_clones() {
        let store = KvStore::default();
        let clone = store.clone();
        store.set("answer", json!(42));
        assert_eq!(clone.get("answer"), Some(json!(42)));
        assert_eq!(clone.snapshot()["answer"], json!(42));
    }

    #[test]
    fn test_registry_set_missing_file() {
        let pages = registry();
        let config = SiteConfig::default();
        let err = pages.set("nope", &config).unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }));
    }
}
