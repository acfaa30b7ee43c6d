//! Layout rendering through tera templates.
//!
//! The build pipeline only depends on the [`LayoutEngine`] trait: it hands
//! over a resolved prop set and gets an HTML string back. [`TeraEngine`] is
//! the production implementation, loading one template file per layout from
//! the template root.
//!
//! Templates see the page's frontmatter at the top level plus the
//! underscore-prefixed context fields (`_ID`, `_self`, `_parents`, `_url`,
//! `_pages`, `_nav`, `_site`, `_store`, `_body`), the `relative_url`, `store_get`
//! and `store_set` functions and a `markdown` filter.

use crate::config::SiteConfig;
use crate::parse::markdown_to_html;
use crate::render::{RenderError, relative_url};
use crate::store::KvStore;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tera::Tera;

/// Everything a layout implementation receives for one render call.
///
/// Created per render call and discarded once it has produced HTML; it
/// owns nothing persistent.
#[derive(Debug)]
pub struct TemplateProps<'a> {
    /// Page ID (content-relative directory path)
    pub id: &'a str,
    /// Content-relative path of the file being rendered
    pub file: &'a str,
    /// Derived page URL
    pub url: String,
    /// Ancestor IDs, root-to-self order
    pub parents: &'a [String],
    /// Whether this render is a documentation preview
    pub is_docs: bool,
    /// Rendered markdown body of this file, empty for index files
    pub body: &'a str,
    /// Frontmatter with all partials already resolved
    pub frontmatter: &'a Value,
    /// Page registry snapshot, ID to frontmatter
    pub pages: Value,
    /// Ordered list of all discovered page IDs
    pub nav: Vec<String>,
}

/// Seam between the render pipeline and the template implementation.
pub trait LayoutEngine: Send + Sync {
    /// Render `layout` with the given props to an HTML string.
    fn render(&self, layout: &str, props: &TemplateProps<'_>) -> Result<String, RenderError>;

    /// Reload all templates from disk, dropping any cached state.
    fn reload(&self) -> Result<(), RenderError>;

    /// IDs of all known layouts.
    fn template_ids(&self) -> Vec<String>;
}

// ============================================================================
// Tera implementation
// ============================================================================

/// [`LayoutEngine`] backed by a tera environment over the template root.
///
/// Layout ID `page` maps to the template file `page.html`.
pub struct TeraEngine {
    tera: RwLock<Tera>,
    store: KvStore,
    /// Site metadata and `[extra]` config fields, exposed as `_site`
    site: Value,
}

impl TeraEngine {
    /// Load all `*.html` templates under the configured template root.
    pub fn new(config: &SiteConfig, store: KvStore) -> Result<Self, RenderError> {
        let glob = format!("{}/**/*.html", config.build.templates.display());
        let mut tera = Tera::new(&glob).map_err(|err| RenderError::TemplateLoad {
            message: tera_message(&err),
        })?;
        // props carry pre-rendered HTML (resolved partials, bodies), so
        // layouts get raw values rather than entity-escaped ones
        tera.autoescape_on(vec![]);
        register_extensions(&mut tera, config, &store);
        Ok(Self {
            tera: RwLock::new(tera),
            store,
            site: site_context(config),
        })
    }
}

/// The static `_site` value: title, root and any `[extra]` fields.
fn site_context(config: &SiteConfig) -> Value {
    let mut site = serde_json::Map::new();
    site.insert("title".to_string(), Value::String(config.site.title.clone()));
    site.insert("root".to_string(), Value::String(config.site.root.clone()));
    for (key, value) in &config.extra {
        if let Ok(value) = serde_json::to_value(value) {
            site.insert(key.clone(), value);
        }
    }
    Value::Object(site)
}

impl LayoutEngine for TeraEngine {
    fn render(&self, layout: &str, props: &TemplateProps<'_>) -> Result<String, RenderError> {
        let name = format!("{layout}.html");
        let tera = self.tera.read();

        if !tera.get_template_names().any(|n| n == name) {
            return Err(RenderError::MissingTemplate {
                layout: layout.to_string(),
                file: props.file.to_string(),
            });
        }

        let mut context = tera::Context::new();
        if let Value::Object(map) = props.frontmatter {
            for (key, value) in map {
                context.insert(key, value);
            }
        }
        context.insert("_ID", props.id);
        context.insert("_self", props.file);
        context.insert("_url", &props.url);
        context.insert("_parents", props.parents);
        context.insert("_isDocs", &props.is_docs);
        context.insert("_pages", &props.pages);
        context.insert("_nav", &props.nav);
        context.insert("_site", &self.site);
        context.insert("_store", &self.store.snapshot());
        context.insert("_body", props.body);

        tera.render(&name, &context)
            .map_err(|err| RenderError::Render {
                layout: layout.to_string(),
                file: props.file.to_string(),
                message: tera_message(&err),
            })
    }

    fn reload(&self) -> Result<(), RenderError> {
        self.tera
            .write()
            .full_reload()
            .map_err(|err| RenderError::TemplateLoad {
                message: tera_message(&err),
            })
    }

    fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tera
            .read()
            .get_template_names()
            .filter_map(|name| name.strip_suffix(".html"))
            .map(str::to_string)
            .collect();
        ids.sort();
        ids
    }
}

/// Register the helper functions and filters every template can use.
fn register_extensions(tera: &mut Tera, config: &SiteConfig, store: &KvStore) {
    let site_root = config.site.root.clone();
    let homepage = config.build.homepage.clone();
    tera.register_function(
        "relative_url",
        move |args: &HashMap<String, Value>| -> tera::Result<Value> {
            let url = str_arg(args, "url", "relative_url")?;
            let id = str_arg(args, "id", "relative_url")?;
            Ok(Value::String(relative_url(url, id, &site_root, &homepage)))
        },
    );

    let getter = store.clone();
    tera.register_function(
        "store_get",
        move |args: &HashMap<String, Value>| -> tera::Result<Value> {
            let key = str_arg(args, "key", "store_get")?;
            Ok(getter.get(key).unwrap_or(Value::Null))
        },
    );

    let setter = store.clone();
    tera.register_function(
        "store_set",
        move |args: &HashMap<String, Value>| -> tera::Result<Value> {
            let key = str_arg(args, "key", "store_set")?;
            let value = args
                .get("value")
                .ok_or_else(|| tera::Error::msg("store_set requires `value`"))?;
            setter.set(key, value.clone());
            Ok(Value::Null)
        },
    );

    tera.register_filter(
        "markdown",
        |value: &Value, _: &HashMap<String, Value>| -> tera::Result<Value> {
            let markdown = value
                .as_str()
                .ok_or_else(|| tera::Error::msg("markdown filter expects a string"))?;
            Ok(Value::String(markdown_to_html(markdown)))
        },
    );
}

fn str_arg<'a>(
    args: &'a HashMap<String, Value>,
    key: &str,
    function: &str,
) -> tera::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg(format!("{function} requires string `{key}`")))
}

/// Flatten a tera error chain into one message.
fn tera_message(err: &tera::Error) -> String {
    use std::error::Error as _;

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ============================================================================
// Tests
// ============================================================================
