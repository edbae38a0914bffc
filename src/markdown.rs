//! Markdown to HTML conversion.
//!
//! The converter is pulldown-cmark. Every render call requests the same fixed
//! extension set ([`EXTENSIONS`]); extensions without a pulldown-cmark switch are
//! either native CommonMark behaviour or handled by a small pass over the source
//! or the event stream.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};

use crate::error::ViewerError;

/// A markdown extension requested from the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    CodeFriendly,
    CuddledLists,
    FencedCodeBlocks,
    Footnotes,
    HeaderIds,
    Metadata,
    Pyshell,
    SmartyPants,
    WikiTables,
    Xml,
    TagFriendly,
}

/// The extension set used for every render.
pub const EXTENSIONS: [Extension; 11] = [
    Extension::CodeFriendly,
    Extension::CuddledLists,
    Extension::FencedCodeBlocks,
    Extension::Footnotes,
    Extension::HeaderIds,
    Extension::Metadata,
    Extension::Pyshell,
    Extension::SmartyPants,
    Extension::WikiTables,
    Extension::Xml,
    Extension::TagFriendly,
];

impl Extension {
    pub fn name(self) -> &'static str {
        match self {
            Extension::CodeFriendly => "code-friendly",
            Extension::CuddledLists => "cuddled-lists",
            Extension::FencedCodeBlocks => "fenced-code-blocks",
            Extension::Footnotes => "footnotes",
            Extension::HeaderIds => "header-ids",
            Extension::Metadata => "metadata",
            Extension::Pyshell => "pyshell",
            Extension::SmartyPants => "smarty-pants",
            Extension::WikiTables => "wiki-tables",
            Extension::Xml => "xml",
            Extension::TagFriendly => "tag-friendly",
        }
    }

    /// Parser switch for this extension, if pulldown-cmark has one.
    fn option(self) -> Option<Options> {
        match self {
            Extension::Footnotes => Some(Options::ENABLE_FOOTNOTES),
            Extension::HeaderIds => Some(Options::ENABLE_HEADING_ATTRIBUTES),
            Extension::Metadata => Some(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS),
            Extension::SmartyPants => Some(Options::ENABLE_SMART_PUNCTUATION),
            // Native CommonMark behaviour or handled outside the parser.
            Extension::CodeFriendly
            | Extension::CuddledLists
            | Extension::FencedCodeBlocks
            | Extension::Pyshell
            | Extension::WikiTables
            | Extension::Xml
            | Extension::TagFriendly => None,
        }
    }
}

/// Converts markdown text to an HTML fragment.
pub trait Render {
    fn render(&self, text: &str) -> Result<String, ViewerError>;
}

/// pulldown-cmark backed renderer.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    extensions: Vec<Extension>,
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::with_extensions(&EXTENSIONS)
    }
}

impl MarkdownRenderer {
    pub fn with_extensions(extensions: &[Extension]) -> Self {
        let options = extensions
            .iter()
            .filter_map(|ext| ext.option())
            .fold(Options::empty(), |acc, opt| acc | opt);
        Self {
            extensions: extensions.to_vec(),
            options,
        }
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    fn has(&self, ext: Extension) -> bool {
        self.extensions.contains(&ext)
    }

    /// Parser events for `source`, with underscore emphasis undone when
    /// code-friendly is on.
    fn events<'s>(&self, source: &'s str) -> Box<dyn Iterator<Item = Event<'s>> + 's> {
        let parser = Parser::new_ext(source, self.options).into_offset_iter();
        if self.has(Extension::CodeFriendly) {
            Box::new(UnderscoreLiteral::new(source, parser))
        } else {
            Box::new(parser.map(|(event, _)| event))
        }
    }

    /// Renders a single line of span-level markdown without the paragraph.
    fn render_inline(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let events = self.events(text).filter(|event| {
            !matches!(
                event,
                Event::Start(Tag::Paragraph) | Event::End(TagEnd::Paragraph)
            )
        });
        html::push_html(&mut output, events);
        output
    }

    fn render_html(&self, text: &str) -> String {
        let shelled = if self.has(Extension::Pyshell) {
            fence_pyshell_blocks(text)
        } else {
            Cow::Borrowed(text)
        };
        let source = if self.has(Extension::WikiTables) {
            wiki_tables(&shelled, |cell| self.render_inline(cell))
        } else {
            Cow::Borrowed(&*shelled)
        };

        let events = self.events(&source);
        let mut output = String::with_capacity(source.len() * 3 / 2);
        if self.has(Extension::HeaderIds) {
            html::push_html(&mut output, HeadingIds::new(events));
        } else {
            html::push_html(&mut output, events);
        }
        output
    }
}

impl Render for MarkdownRenderer {
    fn render(&self, text: &str) -> Result<String, ViewerError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.render_html(text))).map_err(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "converter panicked".to_string());
            ViewerError::RenderFailure(reason)
        })
    }
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Turns interactive Python sessions (`>>>` blocks) into fenced code so they are
/// not parsed as nested block quotes. Lines inside existing fences are skipped.
fn fence_pyshell_blocks(text: &str) -> Cow<'_, str> {
    if !text.contains(">>>") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_code_block = false;
    let mut in_shell = false;
    let mut prev_blank = true;

    for line in text.lines() {
        let blank = line.trim().is_empty();

        if in_shell {
            if blank {
                out.push_str("```\n");
                in_shell = false;
            } else {
                out.push_str(line);
                out.push('\n');
                prev_blank = false;
                continue;
            }
        } else if is_fence(line) {
            in_code_block = !in_code_block;
        } else if !in_code_block && prev_blank && line.trim_start().starts_with(">>>") {
            out.push_str("```\n");
            out.push_str(line.trim_start());
            out.push('\n');
            in_shell = true;
            prev_blank = false;
            continue;
        }

        out.push_str(line);
        out.push('\n');
        prev_blank = blank;
    }

    if in_shell {
        out.push_str("```\n");
    }

    Cow::Owned(out)
}

/// A `||cell||cell||` row, indented less than a code block.
fn is_wiki_row(line: &str) -> bool {
    let row = line.trim_start_matches(' ');
    let row_end = row.trim_end();
    line.len() - row.len() < 4
        && row_end.len() >= 4
        && row_end.starts_with("||")
        && row_end.ends_with("||")
}

fn push_wiki_table(out: &mut String, rows: &mut Vec<&str>, cell: &impl Fn(&str) -> String) {
    if rows.is_empty() {
        return;
    }
    // blank lines around it keep the table one HTML block
    out.push_str("\n<table>\n<tbody>\n");
    for row in rows.drain(..) {
        out.push_str("<tr>");
        for text in row[2..row.len() - 2].split("||") {
            out.push_str("<td>");
            out.push_str(&cell(text.trim()));
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n\n");
}

/// Turns blocks of `||a||b||` rows into HTML tables. Cell text is rendered with
/// `cell`. Lines inside fences are skipped.
fn wiki_tables<'t>(text: &'t str, cell: impl Fn(&str) -> String) -> Cow<'t, str> {
    if !text.contains("||") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 64);
    let mut rows = Vec::new();
    let mut in_code_block = false;

    for line in text.lines() {
        if !in_code_block && is_wiki_row(line) {
            rows.push(line.trim());
            continue;
        }
        push_wiki_table(&mut out, &mut rows, &cell);
        if is_fence(line) {
            in_code_block = !in_code_block;
        }
        out.push_str(line);
        out.push('\n');
    }
    push_wiki_table(&mut out, &mut rows, &cell);

    Cow::Owned(out)
}

/// Event adapter that keeps `_` and `__` literal: emphasis opened with an
/// underscore is turned back into its delimiter text.
struct UnderscoreLiteral<'a, I> {
    source: &'a str,
    inner: I,
    // one entry per open emphasis, true when it was opened with `_`
    open: Vec<bool>,
}

impl<'a, I> UnderscoreLiteral<'a, I> {
    fn new(source: &'a str, inner: I) -> Self {
        Self {
            source,
            inner,
            open: Vec::new(),
        }
    }
}

impl<'a, I: Iterator<Item = (Event<'a>, Range<usize>)>> Iterator for UnderscoreLiteral<'a, I> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        let (event, range) = self.inner.next()?;
        let delimiter = match &event {
            Event::Start(Tag::Emphasis) => {
                let underscore = self.source.as_bytes().get(range.start) == Some(&b'_');
                self.open.push(underscore);
                underscore.then_some("_")
            }
            Event::Start(Tag::Strong) => {
                let underscore = self.source.as_bytes().get(range.start) == Some(&b'_');
                self.open.push(underscore);
                underscore.then_some("__")
            }
            Event::End(TagEnd::Emphasis) => self.open.pop().unwrap_or(false).then_some("_"),
            Event::End(TagEnd::Strong) => self.open.pop().unwrap_or(false).then_some("__"),
            _ => None,
        };
        match delimiter {
            Some(text) => Some(Event::Text(CowStr::Borrowed(text))),
            None => Some(event),
        }
    }
}

/// Lowercase slug: alphanumerics kept, any other run collapses to one `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("section");
    }
    slug
}

/// Event adapter giving every heading without an explicit id a unique slug id.
struct HeadingIds<'a, I> {
    inner: I,
    pending: std::collections::VecDeque<Event<'a>>,
    used: HashMap<String, usize>,
}

impl<'a, I: Iterator<Item = Event<'a>>> HeadingIds<'a, I> {
    fn new(inner: I) -> Self {
        Self {
            inner,
            pending: Default::default(),
            used: HashMap::new(),
        }
    }

    fn unique(&mut self, base: String) -> String {
        let count = self.used.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            let candidate = format!("{base}-{count}");
            self.used.insert(candidate.clone(), 1);
            candidate
        }
    }
}

impl<'a, I: Iterator<Item = Event<'a>>> Iterator for HeadingIds<'a, I> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        match self.inner.next()? {
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => {
                if let Some(id) = id {
                    self.used.insert(id.to_string(), 1);
                    return Some(Event::Start(Tag::Heading {
                        level,
                        id: Some(id),
                        classes,
                        attrs,
                    }));
                }

                let mut title = String::new();
                for event in self.inner.by_ref() {
                    match &event {
                        Event::Text(text) | Event::Code(text) => title.push_str(text),
                        _ => {}
                    }
                    let done = matches!(event, Event::End(TagEnd::Heading(_)));
                    self.pending.push_back(event);
                    if done {
                        break;
                    }
                }

                let id = self.unique(slugify(&title));
                Some(Event::Start(Tag::Heading {
                    level,
                    id: Some(CowStr::from(id)),
                    classes,
                    attrs,
                }))
            }
            event => Some(event),
        }
    }
}
