//! Content parsing: frontmatter extraction, YAML and markdown.
//!
//! Three file shapes are understood:
//!
//! - `.yml` index files: the whole document is YAML frontmatter, no body
//! - `---` delimited files: a YAML block followed by a markdown body
//! - anything else: a markdown body with empty frontmatter
//!
//! YAML parse failures are recovered in dev builds (empty frontmatter,
//! logged) and fatal in production builds.

use crate::config::Profile;
use crate::log;
use crate::render::RenderError;
use pulldown_cmark::{Options, Parser, html};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

static FRONTMATTER_REGEX: OnceLock<Regex> = OnceLock::new();

fn frontmatter_regex() -> &'static Regex {
    FRONTMATTER_REGEX
        .get_or_init(|| Regex::new(r"(?s)^---\s*\r?\n(.*?)(?:\r?\n)?---\s*\r?\n?(.*)$").unwrap())
}

/// A content file split into structured frontmatter and rendered body.
#[derive(Debug, Clone, Default)]
pub struct ParsedContent {
    /// Frontmatter as a JSON value tree (mapping at the top in practice)
    pub frontmatter: Value,
    /// Markdown body rendered to HTML; empty for `.yml` index files
    pub body: String,
}

/// Parse the content of a file into frontmatter and body.
///
/// `file` is the content-relative file ID, used to pick the file shape and
/// for error context.
pub fn parse_content(content: &str, file: &str, profile: Profile) -> Result<ParsedContent, RenderError> {
    if file.ends_with(".yml") {
        // index files are pure YAML, no markdown body
        return Ok(ParsedContent {
            frontmatter: parse_yaml(content, file, profile)?,
            body: String::new(),
        });
    }

    if let Some(captures) = frontmatter_regex().captures(content) {
        let yaml = captures.get(1).map_or("", |m| m.as_str());
        let body = captures.get(2).map_or("", |m| m.as_str());
        return Ok(ParsedContent {
            frontmatter: parse_yaml(yaml, file, profile)?,
            body: markdown_to_html(body),
        });
    }

    // markdown without a leading delimiter: body only, no frontmatter
    Ok(ParsedContent {
        frontmatter: Value::Object(Map::new()),
        body: markdown_to_html(content),
    })
}

/// Parse a YAML string into a JSON value tree.
///
/// An empty or all-null document yields an empty mapping. In dev builds a
/// syntax error is logged and recovered with an empty mapping; production
/// builds fail instead.
pub fn parse_yaml(yaml: &str, file: &str, profile: Profile) -> Result<Value, RenderError> {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(value) => Ok(value),
        Err(source) if profile.is_production() => Err(RenderError::Parse {
            file: file.to_string(),
            source,
        }),
        Err(source) => {
            log!("error"; "invalid yaml in `{file}`: {source}");
            Ok(Value::Object(Map::new()))
        }
    }
}

/// Render markdown to HTML.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_index_file_is_pure_yaml() {
        let parsed = parse_content("title: Home\nhero: hero.md\n", "index/index.yml", Profile::Dev)
            .unwrap();
        assert_eq!(parsed.frontmatter["title"], json!("Home"));
        assert_eq!(parsed.frontmatter["hero"], json!("hero.md"));
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn test_parse_markdown_with_frontmatter() {
        let content = "---\ntitle: Fragment\n---\n# Hello\n\nWorld.\n";
        let parsed = parse_content(content, "blog/hero.md", Profile::Dev).unwrap();
        assert_eq!(parsed.frontmatter["title"], json!("Fragment"));
        assert!(parsed.body.contains("<h1>Hello</h1>"));
        assert!(parsed.body.contains("<p>World.</p>"));
    }

    #[test]
    fn test_parse_markdown_without_frontmatter() {
        let parsed = parse_content("just *markdown*", "blog/hero.md", Profile::Dev).unwrap();
        assert_eq!(parsed.frontmatter, json!({}));
        assert!(parsed.body.contains("<em>markdown</em>"));
    }

    #[test]
    fn test_parse_crlf_frontmatter() {
        let content = "---\r\ntitle: CRLF\r\n---\r\nbody\r\n";
        let parsed = parse_content(content, "a/b.md", Profile::Dev).unwrap();
        assert_eq!(parsed.frontmatter["title"], json!("CRLF"));
        assert!(parsed.body.contains("body"));
    }

    #[test]
    fn test_empty_yaml_yields_empty_mapping() {
        assert_eq!(
            parse_yaml("", "x.yml", Profile::Dev).unwrap(),
            json!({})
        );
        assert_eq!(
            parse_yaml("# only a comment\n", "x.yml", Profile::Dev).unwrap(),
            json!({})
        );
    }

    #[test]
    fn test_invalid_yaml_recovers_in_dev() {
        let value = parse_yaml("title: [unclosed", "x.yml", Profile::Dev).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_invalid_yaml_fails_in_production() {
        let result = parse_yaml("title: [unclosed", "x.yml", Profile::Production);
        assert!(matches!(result, Err(RenderError::Parse { .. })));
    }

    #[test]
    fn test_nested_frontmatter_tree() {
        let yaml = "header:\n  logo: logo.md\nitems:\n  - one.md\n  - plain string\n";
        let value = parse_yaml(yaml, "x.yml", Profile::Dev).unwrap();
        assert_eq!(value["header"]["logo"], json!("logo.md"));
        assert_eq!(value["items"][1], json!("plain string"));
    }

    #[test]
    fn test_markdown_to_html() {
        assert_eq!(markdown_to_html("# Hi"), "<h1>Hi</h1>\n");
    }
}
