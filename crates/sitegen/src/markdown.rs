// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Markdown pages: YAML front matter plus a CommonMark body.
//!
//! Uses pulldown-cmark directly with the GFM extensions sites usually want
//! (tables, strikethrough, task lists). Headings get `id` attributes so they
//! can be linked to.

use anyhow::{Context, anyhow};
use docstore::{Document, Metadata};
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html::push_html};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Split `---` delimited front matter from the body.
///
/// Returns `None` for the front matter when the page has none, or when the
/// opening fence is never closed (the whole text is then body).
#[must_use]
pub fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Parse front matter into document metadata. It must be a YAML mapping.
pub fn parse_front_matter(yaml: &str) -> anyhow::Result<Metadata> {
    if yaml.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let value: Value = serde_yaml_ng::from_str(yaml).context("invalid front matter")?;
    match value {
        Value::Null => Ok(Metadata::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(anyhow!(
            "front matter must be a mapping, found {}",
            kind_of(&other)
        )),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Render CommonMark to HTML.
#[must_use]
pub fn render_markdown(text: &str) -> String {
    let options =
        Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS | Options::ENABLE_TABLES;
    let events = with_heading_anchors(Parser::new_ext(text, options));

    let mut html = String::with_capacity(text.len() * 2);
    push_html(&mut html, events.into_iter());
    html
}

/// Turn a page document into its HTML fragment.
///
/// Returns `Ok(None)` for drafts when drafts are not published. The title
/// comes from front matter, falling back to the file stem.
pub fn render_page(doc: &Document, publish_drafts: bool) -> anyhow::Result<Option<Document>> {
    let text = doc
        .content()
        .as_text()
        .ok_or_else(|| anyhow!("page is not valid UTF-8"))?;

    let (front, body) = split_front_matter(text);
    let metadata = match front {
        Some(yaml) => parse_front_matter(yaml)?,
        None => Metadata::new(),
    };

    if !publish_drafts && metadata.get("draft").and_then(Value::as_bool) == Some(true) {
        return Ok(None);
    }

    let title = metadata
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default_title(doc.id().as_str()));

    let destination = Path::new(doc.id().as_str()).with_extension("html");

    Ok(Some(
        doc.clone()
            .with_metadata_map(metadata)
            .with_metadata("title", title)
            .with_content(render_markdown(body))
            .with_destination(destination),
    ))
}

fn default_title(id: &str) -> String {
    Path::new(id)
        .file_stem()
        .map(|stem| stem.to_string_lossy().replace(['-', '_'], " "))
        .unwrap_or_else(|| id.to_string())
}

/// Lowercase alphanumerics joined by single hyphens.
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.extend(word.chars().flat_map(char::to_lowercase));
    }
    slug
}

struct OpenHeading<'a> {
    level: HeadingLevel,
    start: Event<'a>,
    inner: Vec<Event<'a>>,
    text: String,
}

impl<'a> OpenHeading<'a> {
    fn close(self, end: Event<'a>, used: &mut HashMap<String, usize>, out: &mut Vec<Event<'a>>) {
        let base = slugify(&self.text);
        if base.is_empty() {
            out.push(self.start);
            out.extend(self.inner);
            out.push(end);
            return;
        }

        let count = used.entry(base.clone()).or_insert(0);
        let slug = if *count == 0 {
            base
        } else {
            format!("{base}-{count}")
        };
        *count += 1;

        let n = self.level as u8;
        out.push(Event::Html(format!("<h{n} id=\"{slug}\">").into()));
        out.extend(self.inner);
        if n >= 2 {
            out.push(Event::Html(
                format!(" <a class=\"anchor\" href=\"#{slug}\" aria-hidden=\"true\">#</a>").into(),
            ));
        }
        out.push(Event::Html(format!("</h{n}>\n").into()));
    }
}

/// Rewrite headings as `<hN id="slug">`; repeated titles get `-1`, `-2`...
fn with_heading_anchors<'a>(parser: Parser<'a>) -> Vec<Event<'a>> {
    let mut out = Vec::new();
    let mut used = HashMap::new();
    let mut open: Option<OpenHeading<'a>> = None;

    for event in parser {
        if let Some(heading) = open.as_mut() {
            match event {
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(heading) = open.take() {
                        heading.close(event, &mut used, &mut out);
                    }
                }
                Event::Text(ref text) | Event::Code(ref text) => {
                    heading.text.push_str(text);
                    heading.inner.push(event);
                }
                other => heading.inner.push(other),
            }
            continue;
        }

        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                open = Some(OpenHeading {
                    level,
                    start: event,
                    inner: Vec::new(),
                    text: String::new(),
                });
            }
            other => out.push(other),
        }
    }
    out
}
