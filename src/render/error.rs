//! Render error types.

use thiserror::Error;

/// Errors raised while rendering a single page or partial.
///
/// These stay local to the page being rendered; the orchestrator collects
/// them per page and reports an aggregate.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A page or partial transitively references itself. Always fatal to
    /// that page's build, never retried.
    #[error("circular dependency ({file}) detected in {parent}, chain: {}", chain.join(" -> "))]
    Circular {
        file: String,
        parent: String,
        chain: Vec<String>,
    },

    #[error("invalid yaml in `{file}`")]
    Parse {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("layout `{layout}` not found for `{file}`")]
    MissingTemplate { layout: String, file: String },

    #[error("layout `{layout}` failed for `{file}`: {message}")]
    Render {
        layout: String,
        file: String,
        message: String,
    },

    #[error("failed to read `{file}`")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load templates: {message}")]
    TemplateLoad { message: String },

    /// A partial somewhere inside the frontmatter failed; carries the
    /// partial's own path for diagnostics.
    #[error("partial `{partial}` failed")]
    Partial {
        partial: String,
        #[source]
        source: Box<RenderError>,
    },
}

impl RenderError {
    /// True if the underlying failure is a circular dependency, looking
    /// through any partial wrappers.
    pub fn is_circular(&self) -> bool {
        match self {
            Self::Circular { .. } => true,
            Self::Partial { source, .. } => source.is_circular(),
            _ => false,
        }
    }

    /// The circular reference chain, if this is a circular failure.
    pub fn circular_chain(&self) -> Option<&[String]> {
        match self {
            Self::Circular { chain, .. } => Some(chain),
            Self::Partial { source, .. } => source.circular_chain(),
            _ => None,
        }
    }
}
