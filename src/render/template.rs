//! Page template with `{title}`, `{last_updated}` and `{email_content}`
//! placeholders.
//!
//! The template is split into segments once. Rendering writes each segment
//! in turn, so text substituted into one placeholder is never searched for
//! another.

use std::path::Path;

use crate::error::{Error, Result};

const BUILTIN_TEMPLATE: &str = include_str!("../../templates/blog_template.html");
const BUILTIN_NAME: &str = "<built-in>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Title,
    LastUpdated,
    Content,
}

impl Placeholder {
    const ALL: [Placeholder; 3] = [Self::Title, Self::LastUpdated, Self::Content];

    fn token(self) -> &'static str {
        match self {
            Self::Title => "{title}",
            Self::LastUpdated => "{last_updated}",
            Self::Content => "{email_content}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// Values substituted into a [`Template`]. All are inserted verbatim, so
/// `title` must already be escaped.
#[derive(Debug, Clone, Copy)]
pub struct PageValues<'a> {
    pub title: &'a str,
    pub last_updated: &'a str,
    pub content: &'a str,
}

/// A compiled page template.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// The template shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::compile(BUILTIN_TEMPLATE, Path::new(BUILTIN_NAME))
    }

    /// Read and compile a template file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let template = Self::compile(&source, path)?;
        tracing::info!(path = %path.display(), "Loaded page template");
        Ok(template)
    }

    /// Compile template text. `origin` is only used in error messages.
    ///
    /// Every placeholder must appear at least once.
    pub fn compile(source: &str, origin: &Path) -> Result<Self> {
        let missing: Vec<&str> = Placeholder::ALL
            .iter()
            .filter(|p| !source.contains(p.token()))
            .map(|p| p.token())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Template {
                path: origin.to_path_buf(),
                reason: format!("missing placeholder(s): {}", missing.join(", ")),
            });
        }

        let mut segments = Vec::new();
        let mut rest = source;
        loop {
            let next = Placeholder::ALL
                .iter()
                .filter_map(|&p| rest.find(p.token()).map(|pos| (pos, p)))
                .min_by_key(|&(pos, _)| pos);

            let Some((pos, placeholder)) = next else {
                if !rest.is_empty() {
                    segments.push(Segment::Literal(rest.to_string()));
                }
                break;
            };

            if pos > 0 {
                segments.push(Segment::Literal(rest[..pos].to_string()));
            }
            segments.push(Segment::Slot(placeholder));
            rest = &rest[pos + placeholder.token().len()..];
        }

        Ok(Self { segments })
    }

    pub fn render(&self, values: &PageValues<'_>) -> String {
        let mut out = String::with_capacity(self.literal_len() + values.content.len() + 256);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(Placeholder::Title) => out.push_str(values.title),
                Segment::Slot(Placeholder::LastUpdated) => out.push_str(values.last_updated),
                Segment::Slot(Placeholder::Content) => out.push_str(values.content),
            }
        }
        out
    }

    fn literal_len(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.len(),
                Segment::Slot(_) => 0,
            })
            .sum()
    }
}
