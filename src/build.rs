//! Site building orchestration.
//!
//! Coordinates page rendering and asset copying.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── pre_render()
//!     │       │
//!     │       └── Discover pages, reload templates,
//!     │           read all frontmatter into the registry
//!     │
//!     ├── render_all_pages() ──► Write one HTML file per page
//!     │
//!     └── copy_assets() ──► Copy asset files into the output
//! ```

use crate::{
    config::SiteConfig,
    engine::{LayoutEngine, TeraEngine},
    log,
    logger::ProgressBars,
    render::assets::copy_assets,
    render::page::render_page,
    store::{KvStore, LayoutIndex, PageRegistry},
};
use anyhow::{Context, Result, bail};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::fs;
use walkdir::WalkDir;

/// Everything one build or watch session works against.
///
/// The stores live here instead of in globals so a session owns exactly
/// its own state and tests can stand up several sites side by side.
pub struct Site<'c> {
    pub config: &'c SiteConfig,
    pub pages: PageRegistry,
    pub layouts: LayoutIndex,
    pub store: KvStore,
    pub engine: Box<dyn LayoutEngine>,
    nav: RwLock<Vec<String>>,
}

impl<'c> Site<'c> {
    /// Stand up a site with the default tera engine over the configured
    /// template root.
    pub fn new(config: &'c SiteConfig) -> Result<Self> {
        let store = KvStore::default();
        let engine = TeraEngine::new(config, store.clone())
            .with_context(|| format!("loading templates from {}", config.build.templates.display()))?;
        Ok(Self::with_engine(config, Box::new(engine), store))
    }

    /// Stand up a site around an already constructed engine.
    pub fn with_engine(config: &'c SiteConfig, engine: Box<dyn LayoutEngine>, store: KvStore) -> Self {
        Self {
            config,
            pages: PageRegistry::new(config.site.root.clone(), config.build.homepage.clone()),
            layouts: LayoutIndex::new(),
            store,
            engine,
            nav: RwLock::new(Vec::new()),
        }
    }

    /// Ordered snapshot of all discovered page IDs.
    pub fn nav(&self) -> Vec<String> {
        self.nav.read().clone()
    }

    fn set_nav(&self, ids: Vec<String>) {
        *self.nav.write() = ids;
    }
}

/// Build the entire site, rendering pages and copying assets in parallel.
///
/// If `config.build.clean` is true, clears the output directory first.
/// All pages are attempted even when some fail; the error lists every
/// page that did.
pub fn build_site(site: &Site<'_>) -> Result<()> {
    let config = site.config;
    if config.build.clean && config.build.output.is_dir() {
        fs::remove_dir_all(&config.build.output)
            .with_context(|| format!("cleaning {}", config.build.output.display()))?;
    }

    let pages = pre_render(site)?;
    log!("build"; "found {} pages", pages.len());

    let progress = ProgressBars::new(&[("content", pages.len())]);
    let (render_result, assets_result) = rayon::join(
        || render_all_pages(site, &pages, || progress.inc_by_name("content")),
        || copy_assets(config),
    );
    progress.finish();

    let copied = assets_result?;
    render_result?;
    log!("build"; "done, {} page(s), {} asset(s)", pages.len(), copied);
    Ok(())
}

/// Reset the stores and fill them back up from disk.
///
/// Returns the discovered page IDs. After this the registry holds every
/// page's raw frontmatter, so the first page rendered already sees all of
/// its siblings.
pub fn pre_render(site: &Site<'_>) -> Result<Vec<String>> {
    site.pages.clear();
    site.layouts.clear();
    site.engine
        .reload()
        .context("reloading templates")?;

    let templates = site.engine.template_ids();
    let layouts = &site.config.layouts;
    for layout in [&layouts.page, &layouts.partial] {
        if !templates.iter().any(|t| t == layout) {
            log!("build"; "default layout `{layout}` has no template file");
        }
    }

    let pages = discover_pages(site.config);
    site.set_nav(pages.clone());
    site.pages.set_all(&pages, site.config)?;
    Ok(pages)
}

/// Render every page in parallel, collecting all failures.
pub fn render_all_pages(
    site: &Site<'_>,
    pages: &[String],
    on_progress: impl Fn() + Sync,
) -> Result<()> {
    let failures: Vec<(String, String)> = pages
        .par_iter()
        .filter_map(|id| {
            let result = render_page(site, id);
            on_progress();
            result.err().map(|err| (id.clone(), format!("{err:#}")))
        })
        .collect();

    if failures.is_empty() {
        return Ok(());
    }

    let details: Vec<String> = failures
        .iter()
        .map(|(id, err)| format!("  {id}: {err}"))
        .collect();
    bail!(
        "failed to render {} page(s):\n{}",
        failures.len(),
        details.join("\n")
    );
}

/// Every directory under the content root holding an index file, as a
/// sorted list of content-relative IDs.
pub fn discover_pages(config: &SiteConfig) -> Vec<String> {
    let index_name = format!("{}.yml", config.build.index);
    let mut ids: Vec<String> = WalkDir::new(&config.build.content)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file() && entry.file_name().to_string_lossy() == index_name
        })
        .filter_map(|entry| {
            let dir = entry.path().parent()?;
            let rel = dir.strip_prefix(&config.build.content).ok()?;
            let id = crate::render::normalize_id(&rel.to_string_lossy());
            (!id.is_empty()).then_some(id)
        })
        .collect();
    ids.sort();
    ids
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    pub(crate) fn fixture(files: &[(&str, &str)]) -> (TempDir, SiteConfig) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let mut config = SiteConfig::default();
        config.set_root(dir.path());
        (dir, config)
    }

    #[test]
    fn test_build_site_end_to_end() {
        let (_dir, config) = fixture(&[
            ("content/index/index.yml", "title: Home\n"),
            (
                "content/blog/index.yml",
                "title: Blog\nmain:\n  - hero.md\n",
            ),
            ("content/blog/hero.md", "---\nheadline: Hi\n---\n*text*\n"),
            (
                "templates/page.html",
                "<h1>{{ title }}</h1>{% for item in main | default(value=[]) %}{{ item | safe }}{% endfor %}",
            ),
            (
                "templates/partial.html",
                "<section>{{ headline }}{{ _body | safe }}</section>",
            ),
            ("assets/site.css", "body{}"),
        ]);

        let site = Site::new(&config).unwrap();
        build_site(&site).unwrap();

        let home = fs::read_to_string(config.output_file("index")).unwrap();
        assert!(home.starts_with("<!DOCTYPE html>\n"));
        assert!(home.contains("<h1>Home</h1>"));

        let blog = fs::read_to_string(config.output_file("blog")).unwrap();
        assert!(blog.contains("<section>Hi"));
        assert!(blog.contains("<em>text</em>"));

        assert!(config.assets_output().join("site.css").is_file());

        // the partial's frontmatter merged into its owning page, and the
        // derived URL survived the merge
        let pages = site.pages.get();
        assert_eq!(pages["blog"]["_url"], json!("/blog"));
        assert_eq!(pages["blog"]["headline"], json!("Hi"));
        assert_eq!(pages["index"]["_url"], json!("/"));

        assert_eq!(site.layouts.pages_for("page"), vec!["blog", "index"]);
        assert_eq!(site.layouts.pages_for("partial"), vec!["blog"]);
    }

    #[test]
    fn test_build_site_circular_partial_fails_only_that_page() {
        let (_dir, config) = fixture(&[
            ("content/about/index.yml", "title: About\n"),
            ("content/loop/index.yml", "main:\n  - a.md\n"),
            ("content/loop/a.md", "---\nnext: b.md\n---\nA\n"),
            ("content/loop/b.md", "---\nnext: a.md\n---\nB\n"),
            ("templates/page.html", "<h1>{{ title | default(value='') }}</h1>"),
            ("templates/partial.html", "{{ _body | safe }}"),
        ]);

        let site = Site::new(&config).unwrap();
        let err = build_site(&site).unwrap_err().to_string();
        assert!(err.contains("loop"), "{err}");
        assert!(err.contains("circular dependency"), "{err}");
        assert!(err.contains("loop/a.md -> loop/b.md -> loop/a.md"), "{err}");

        // the healthy sibling still built
        assert!(config.output_file("about").is_file());
        assert!(!config.output_file("loop").exists());
    }

    #[test]
    fn test_build_site_diamond_reference_is_legal() {
        let (_dir, config) = fixture(&[
            ("content/index/index.yml", "one: shared.md\ntwo: shared.md\n"),
            ("content/index/shared.md", "Body\n"),
            (
                "templates/page.html",
                "{{ one | safe }}|{{ two | safe }}",
            ),
            ("templates/partial.html", "<s>{{ _body | safe }}</s>"),
        ]);

        let site = Site::new(&config).unwrap();
        build_site(&site).unwrap();

        let home = fs::read_to_string(config.output_file("index")).unwrap();
        assert_eq!(
            home.matches("<s><p>Body</p>\n</s>").count(),
            2,
            "{home}"
        );
    }

    #[test]
    fn test_build_site_absolute_partial_resolves_from_content_root() {
        let (_dir, config) = fixture(&[
            (
                "content/index/index.yml",
                "main:\n  - /shared/footer.html\n",
            ),
            ("content/shared/footer.html", "<footer>raw</footer>"),
            (
                "templates/page.html",
                "{% for item in main %}{{ item | safe }}{% endfor %}",
            ),
        ]);

        let site = Site::new(&config).unwrap();
        build_site(&site).unwrap();

        let home = fs::read_to_string(config.output_file("index")).unwrap();
        // .html partials are included verbatim, not rendered
        assert!(home.contains("<footer>raw</footer>"));
    }

    #[test]
    fn test_build_site_missing_layout_reported_per_page() {
        let (_dir, config) = fixture(&[
            ("content/index/index.yml", "layout: ghost\n"),
            ("templates/page.html", "x"),
        ]);

        let site = Site::new(&config).unwrap();
        let err = build_site(&site).unwrap_err().to_string();
        assert!(err.contains("failed to render 1 page(s)"), "{err}");
        assert!(err.contains("layout `ghost` not found"), "{err}");
    }

    #[test]
    fn test_discover_pages_sorted() {
        let dir = TempDir::new().unwrap();
        let mut config = SiteConfig::default();
        config.set_root(dir.path());
        for id in ["index", "blog", "blog/post-two", "blog/post-one"] {
            let page = config.build.content.join(id);
            fs::create_dir_all(&page).unwrap();
            fs::write(page.join("index.yml"), "title: x\n").unwrap();
        }
        // a directory without an index file is not a page
        fs::create_dir_all(config.build.content.join("drafts")).unwrap();
        fs::write(config.build.content.join("blog/hero.md"), "body").unwrap();

        assert_eq!(
            discover_pages(&config),
            vec!["blog", "blog/post-one", "blog/post-two", "index"]
        );
    }

    #[test]
    fn test_discover_pages_empty_content() {
        let dir = TempDir::new().unwrap();
        let mut config = SiteConfig::default();
        config.set_root(dir.path());
        assert!(discover_pages(&config).is_empty());
    }
}
