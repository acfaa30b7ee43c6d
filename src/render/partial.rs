//! Partial resolution inside frontmatter trees.
//!
//! Any string leaf of a page's frontmatter that ends in `.md` or `.html`
//! and points at an existing file under the content root is a partial
//! reference. Partials are resolved in parallel, each branch carrying its
//! own copy of the visited stack so that sibling branches can legally
//! reference the same file while true cycles are still caught.

use crate::build::Site;
use crate::render::error::RenderError;
use crate::render::{normalize_id, page::render_file};
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// One step into a frontmatter tree, map key or array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// Replace every partial reference in `tree` with its rendered HTML.
///
/// Leaves are rendered in parallel and written back by position, so the
/// shape of the tree never changes and the result is deterministic.
pub fn resolve_partials(
    site: &Site<'_>,
    mut tree: Value,
    self_file: &str,
    parent: &str,
    visited: &[String],
) -> Result<Value, RenderError> {
    let mut leaves: Vec<(Vec<Step>, String)> = Vec::new();
    collect_string_leaves(&tree, &mut Vec::new(), &mut leaves);

    let rendered: Vec<(Vec<Step>, Option<String>)> = leaves
        .into_par_iter()
        .map(|(path, leaf)| {
            // each branch gets its own visited stack copy
            let html = render_partial(site, &leaf, self_file, parent, visited.to_vec())?;
            Ok((path, html))
        })
        .collect::<Result<_, RenderError>>()?;

    for (path, html) in rendered {
        if let Some(html) = html {
            if let Some(slot) = value_at_path_mut(&mut tree, &path) {
                *slot = Value::String(html);
            }
        }
    }
    Ok(tree)
}

/// Collect every string leaf with the step path that reaches it.
fn collect_string_leaves(value: &Value, path: &mut Vec<Step>, out: &mut Vec<(Vec<Step>, String)>) {
    match value {
        Value::String(s) => out.push((path.clone(), s.clone())),
        Value::Object(map) => {
            for (key, child) in map {
                path.push(Step::Key(key.clone()));
                collect_string_leaves(child, path, out);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(Step::Index(index));
                collect_string_leaves(child, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

fn value_at_path_mut<'a>(root: &'a mut Value, path: &[Step]) -> Option<&'a mut Value> {
    let mut current = root;
    for step in path {
        current = match step {
            Step::Key(key) => current.get_mut(key.as_str())?,
            Step::Index(index) => current.get_mut(index)?,
        };
    }
    Some(current)
}

/// Render a single candidate leaf.
///
/// Returns `Ok(None)` when the leaf is not a partial reference: wrong
/// extension, file missing, or resolving outside the content root. A `.md`
/// partial goes through the full render pipeline; a `.html` partial is
/// included verbatim.
fn render_partial(
    site: &Site<'_>,
    leaf: &str,
    self_file: &str,
    parent: &str,
    visited: Vec<String>,
) -> Result<Option<String>, RenderError> {
    if !(leaf.ends_with(".md") || leaf.ends_with(".html")) {
        return Ok(None);
    }

    let content_root = &site.config.build.content;
    let path = if let Some(absolute) = leaf.strip_prefix('/') {
        content_root.join(absolute)
    } else {
        let self_dir = Path::new(self_file)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(PathBuf::new);
        content_root.join(self_dir).join(leaf)
    };
    if !path.is_file() {
        return Ok(None);
    }

    let file_id = match canonical_content_id(content_root, &path) {
        Some(id) => id,
        None => return Ok(None),
    };

    let content = fs::read_to_string(&path).map_err(|source| RenderError::Io {
        file: file_id.clone(),
        source,
    })?;

    if leaf.ends_with(".html") {
        return Ok(Some(content));
    }

    render_file(site, &content, &file_id, parent, visited)
        .map(Some)
        .map_err(|source| RenderError::Partial {
            partial: leaf.to_string(),
            source: Box::new(source),
        })
}

/// Content-relative ID of a partial file, or `None` if it escapes the
/// content root.
fn canonical_content_id(content_root: &Path, path: &Path) -> Option<String> {
    let root = content_root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    let relative = path.strip_prefix(&root).ok()?;
    Some(normalize_id(&relative.to_string_lossy()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_string_leaves_paths() {
        let tree = json!({
            "sections": [
                { "body": "hero.md" },
                "footer.md",
            ],
            "title": "Hello",
            "count": 3,
        });
        let mut out = Vec::new();
        collect_string_leaves(&tree, &mut Vec::new(), &mut out);

        // serde_json objects iterate keys in sorted order
        assert_eq!(
            out,
            vec![
                (
                    vec![
                        Step::Key("sections".into()),
                        Step::Index(0),
                        Step::Key("body".into()),
                    ],
                    "hero.md".to_string(),
                ),
                (
                    vec![Step::Key("sections".into()), Step::Index(1)],
                    "footer.md".to_string(),
                ),
                (vec![Step::Key("title".into())], "Hello".to_string()),
            ]
        );
    }

    #[test]
    fn test_value_at_path_mut_writes_back() {
        let mut tree = json!({ "sections": ["a.md", "b.md"] });
        let path = vec![Step::Key("sections".into()), Step::Index(1)];
        *value_at_path_mut(&mut tree, &path).unwrap() = json!("<p>b</p>");
        assert_eq!(tree, json!({ "sections": ["a.md", "<p>b</p>"] }));
    }

    #[test]
    fn test_value_at_path_mut_missing() {
        let mut tree = json!({ "a": 1 });
        let path = vec![Step::Key("b".into())];
        assert!(value_at_path_mut(&mut tree, &path).is_none());
    }
}
