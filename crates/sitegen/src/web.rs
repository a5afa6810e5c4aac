// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The default web pipeline.
//!
//! ```text
//! read-content ─▶ markdown ─▶ layout ─┬─▶ sitemap ─┐
//!                                     └────────────┴─▶ output
//! read-assets ───────────────────────────────────────▶ output
//! ```

use crate::config::SiteConfig;
use crate::layouts::{self, PageContext};
use crate::markdown;
use crate::reader::{ReadFiles, ReadKind};
use docstore::Document;
use pipeline::{GraphError, PipelineGraph, Stage, StageOutput, map_documents, transform_fn};
use std::sync::Arc;

pub const READ_CONTENT: &str = "read-content";
pub const READ_ASSETS: &str = "read-assets";
pub const MARKDOWN: &str = "markdown";
pub const LAYOUT: &str = "layout";
pub const SITEMAP: &str = "sitemap";
pub const OUTPUT: &str = "output";

/// Assemble the web pipeline for a site.
pub fn build_graph(config: &SiteConfig) -> Result<PipelineGraph, GraphError> {
    let mut graph = PipelineGraph::new();

    let mut read_content = Stage::new(
        READ_CONTENT,
        Arc::new(ReadFiles::new(&config.input, ReadKind::Text).including(&config.content)),
    )
    .cacheable();
    for pattern in &config.content {
        read_content = read_content.watching(pattern.as_str());
    }
    graph.add_stage(read_content)?;

    graph.add_stage(
        Stage::new(
            READ_ASSETS,
            Arc::new(ReadFiles::new(&config.input, ReadKind::Binary).excluding(&config.content)),
        )
        .cacheable()
        .watching("**"),
    )?;

    let drafts = config.drafts;
    graph.add_stage(
        Stage::new(
            MARKDOWN,
            map_documents(format!("markdown-v1:drafts={drafts}"), move |doc| {
                markdown::render_page(doc, drafts)
            }),
        )
        .depends_on([READ_CONTENT])
        .cacheable(),
    )?;

    let site_title = config.site.title.clone();
    graph.add_stage(
        Stage::new(
            LAYOUT,
            map_documents(format!("layout-v1:{site_title}"), move |doc| {
                Ok(Some(apply_layout(doc, &site_title)))
            }),
        )
        .depends_on([MARKDOWN])
        .cacheable(),
    )?;

    let base_url = config.site.url.clone();
    graph.add_stage(
        Stage::new(
            SITEMAP,
            transform_fn(move |ctx| {
                let base_url = base_url.clone();
                async move {
                    let Some(base_url) = base_url else {
                        return Ok(StageOutput::default());
                    };
                    let pages: Vec<&Document> = ctx.inputs().iter().map(|d| d.as_ref()).collect();
                    let xml = sitemap(&base_url, &pages);
                    Ok(StageOutput::new(vec![
                        Document::new("sitemap.xml", xml).with_destination("sitemap.xml"),
                    ]))
                }
            }),
        )
        .depends_on([LAYOUT]),
    )?;

    graph.add_stage(
        Stage::new(
            OUTPUT,
            transform_fn(|ctx| async move {
                let documents = ctx.inputs().iter().map(|d| d.as_ref().clone()).collect();
                Ok(StageOutput::new(documents))
            }),
        )
        .depends_on([LAYOUT, READ_ASSETS, SITEMAP])
        .output(),
    )?;

    Ok(graph)
}

fn apply_layout(doc: &Document, site_title: &str) -> Document {
    let destination = doc
        .destination()
        .map(|d| d.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    let home = layouts::home_link(&destination);
    let html = layouts::render_page(&PageContext {
        title: doc.get_str("title").unwrap_or(site_title),
        site_title,
        content: doc.content().as_text().unwrap_or_default(),
        home: &home,
    });
    doc.clone().with_content(html)
}

/// `sitemap.xml` listing every page with a destination, sorted by URL.
fn sitemap(base_url: &str, pages: &[&Document]) -> String {
    let base = base_url.trim_end_matches('/');
    let mut locations: Vec<String> = pages
        .iter()
        .filter_map(|doc| doc.destination())
        .map(|dest| {
            let dest = dest.to_string_lossy().replace('\\', "/");
            match dest.strip_suffix("index.html") {
                Some(dir) => format!("{base}/{dir}"),
                None => format!("{base}/{dest}"),
            }
        })
        .collect();
    locations.sort();

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for location in locations {
        xml.push_str("  <url><loc>");
        xml.push_str(&escape_xml(&location));
        xml.push_str("</loc></url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_shape() {
        let graph = build_graph(&SiteConfig::default()).expect("graph");
        let plan = graph.validate().expect("valid");
        let order: Vec<&str> = plan.order().collect();
        assert_eq!(
            order,
            vec![READ_CONTENT, READ_ASSETS, MARKDOWN, LAYOUT, SITEMAP, OUTPUT]
        );
        let outputs: Vec<&str> = graph.output_stages().map(Stage::name).collect();
        assert_eq!(outputs, vec![OUTPUT]);
    }

    #[test]
    fn test_sitemap() {
        let index = Document::new("index.md", "").with_destination("index.html");
        let post = Document::new("posts/a&b.md", "").with_destination("posts/a&b.html");
        let xml = sitemap("https://example.org/", &[&post, &index]);
        assert!(xml.contains("<loc>https://example.org/</loc>"));
        assert!(xml.contains("<loc>https://example.org/posts/a&amp;b.html</loc>"));
        let root = xml.find("example.org/</loc>").expect("root");
        let post = xml.find("posts/").expect("post");
        assert!(root < post);
    }

    #[test]
    fn test_layout_uses_page_title() {
        let doc = Document::new("posts/a.md", "<p>x</p>")
            .with_destination("posts/a.html")
            .with_metadata("title", "Post A");
        let page = apply_layout(&doc, "Site");
        let html = page.content().as_text().expect("text");
        assert!(html.contains("<title>Post A — Site</title>"));
        assert!(html.contains("href=\"../index.html\""));
        assert_eq!(page.id(), doc.id());
    }
}
