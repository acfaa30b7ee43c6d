//! Page and partial rendering.
//!
//! - **page**: render one content file to HTML through its layout
//! - **partial**: find and resolve partial references inside frontmatter
//! - **assets**: copy the asset root into the output
//!
//! # Render Flow
//!
//! ```text
//! render_page() ──► render_file() ──► resolve_partials()
//!                       │   ▲                │
//!                       │   └── recursion ───┘
//!                       ▼
//!                  LayoutEngine ──► HTML
//! ```

pub mod assets;
pub mod error;
pub mod page;
pub mod partial;

pub use error::RenderError;

// ============================================================================
// ID and URL helpers
// ============================================================================

/// Normalize a content-relative path to a slash-separated ID.
///
/// Collapses `.`/`..` segments, unifies directory separators and strips
/// leading/trailing slashes.
pub fn normalize_id(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut out: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

/// The page ID a file belongs to: its containing directory.
///
/// Partials share the ID of the page that structurally contains them.
/// Files at the content root fall back to the homepage ID.
pub fn owning_page_id(file: &str, homepage: &str) -> String {
    let id = normalize_id(file);
    match id.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => homepage.to_string(),
    }
}

/// Ancestor chain of a page ID in root-to-self order.
///
/// Computed by successively truncating the ID's path segments, then
/// prefixing the homepage.
pub fn ancestor_chain(id: &str, homepage: &str) -> Vec<String> {
    let segments: Vec<&str> = id.split('/').collect();
    let mut parents: Vec<String> = (1..=segments.len())
        .map(|len| segments[..len].join("/"))
        .collect();
    if id != homepage {
        parents.insert(0, homepage.to_string());
    }
    parents
}

/// Resolve a relative path from the page `id` to `url`.
///
/// The homepage ID behaves as the empty path; an empty result becomes `.`.
pub fn relative_url(url: &str, id: &str, site_root: &str, homepage: &str) -> String {
    let id = if id == homepage { "" } else { id };
    let from = format!("{site_root}{id}");
    let to = format!("{site_root}{url}");
    let relative = posix_relative(&from, &to);
    if relative.is_empty() {
        ".".to_string()
    } else {
        relative
    }
}

/// POSIX-style relative path between two absolute URL paths.
fn posix_relative(from: &str, to: &str) -> String {
    let from: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    parts.join("/")
}

// ============================================================================
// Tests
// ============================================================================
