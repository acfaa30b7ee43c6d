//! Rendering a single content file to HTML.

use crate::build::Site;
use crate::config::SiteConfig;
use crate::engine::TemplateProps;
use crate::parse::parse_content;
use crate::render::error::RenderError;
use crate::render::partial::resolve_partials;
use crate::render::{ancestor_chain, owning_page_id};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;

/// Render one page's index file and write the result into the output root.
///
/// The configured doctype is prepended to whatever the layout produced.
pub fn render_page(site: &Site<'_>, id: &str) -> anyhow::Result<PathBuf> {
    let file = site.config.index_id(id);
    let path = site.config.index_file(id);
    let content =
        fs::read_to_string(&path).map_err(|source| RenderError::Io { file: file.clone(), source })?;

    let html = render_file(site, &content, &file, "", Vec::new())?;
    let output = site.config.output_file(id);
    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&output, format!("{}\n{html}", site.config.site.doctype))?;
    Ok(output)
}

/// Render one content file, resolving every partial it references.
///
/// `parent` is the file that structurally contains this one and decides
/// the page ID; an empty parent means the file is its own page. `visited`
/// is the chain of files already being rendered on this branch and trips
/// the circular dependency check.
pub fn render_file(
    site: &Site<'_>,
    content: &str,
    file: &str,
    parent: &str,
    mut visited: Vec<String>,
) -> Result<String, RenderError> {
    let parent = if parent.is_empty() { file } else { parent };

    if visited.iter().any(|seen| seen == file) {
        let mut chain = visited.clone();
        chain.push(file.to_string());
        return Err(RenderError::Circular {
            file: file.to_string(),
            parent: parent.to_string(),
            chain,
        });
    }
    visited.push(file.to_string());

    let homepage = &site.config.build.homepage;
    let id = owning_page_id(parent, homepage);
    let parents = ancestor_chain(&id, homepage);

    let parsed = parse_content(content, file, site.config.profile)?;

    // the registry sees this file's raw frontmatter before any partial
    // inside it resolves, so deep trees observe their ancestors
    site.pages.inject(&id, &parsed.frontmatter);

    let mut tree = resolve_partials(site, parsed.frontmatter, file, parent, &visited)?;

    let layout = layout_of(&tree, file, site.config);
    if let Value::Object(map) = &mut tree {
        map.insert("layout".to_string(), json!(layout));
    }
    site.layouts.set(&id, &layout);

    let props = TemplateProps {
        id: &id,
        file,
        url: site.pages.url_for(&id),
        parents: &parents,
        is_docs: false,
        body: &parsed.body,
        frontmatter: &tree,
        pages: site.pages.snapshot(),
        nav: site.nav(),
    };
    site.engine.render(&layout, &props)
}

/// The layout a file renders through: its `layout` frontmatter key, or the
/// configured page layout for index files and partial layout otherwise.
fn layout_of(frontmatter: &Value, file: &str, config: &SiteConfig) -> String {
    if let Some(layout) = frontmatter.get("layout").and_then(Value::as_str) {
        return layout.to_string();
    }
    if file.ends_with(".yml") {
        config.layouts.page.clone()
    } else {
        config.layouts.partial.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
