// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The HTML shell every page is wrapped in.

use maud::{DOCTYPE, Markup, PreEscaped, html};

/// Version baked into generated HTML as `<meta name="generator">`.
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct PageContext<'a> {
    /// Page title (from front matter or file name)
    pub title: &'a str,
    /// Site title (from site.yaml)
    pub site_title: &'a str,
    /// Rendered HTML body
    pub content: &'a str,
    /// Link back to the home page, relative to this page
    pub home: &'a str,
}

#[must_use]
pub fn render_page(ctx: &PageContext) -> String {
    page(ctx).into_string()
}

fn page(ctx: &PageContext) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                meta name="generator" content=(format!("siteforge v{VERSION}"));
                title {
                    @if ctx.title == ctx.site_title {
                        (ctx.site_title)
                    } @else {
                        (ctx.title) " — " (ctx.site_title)
                    }
                }
            }
            body {
                header {
                    a href=(ctx.home) { (ctx.site_title) }
                }
                main {
                    article {
                        (PreEscaped(ctx.content))
                    }
                }
            }
        }
    }
}

/// Relative link from a page at `destination` to the site root's
/// `index.html`, so the tree works from any base path.
#[must_use]
pub fn home_link(destination: &str) -> String {
    let depth = destination.matches('/').count();
    if depth == 0 {
        "index.html".to_string()
    } else {
        format!("{}index.html", "../".repeat(depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_shell() {
        let html = render_page(&PageContext {
            title: "About",
            site_title: "Caspar Water",
            content: "<h1>Hello</h1>",
            home: "index.html",
        });
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>About — Caspar Water</title>"));
        assert!(html.contains("<article><h1>Hello</h1></article>"));
        assert!(html.contains("siteforge v"));
    }

    #[test]
    fn test_titles_are_escaped() {
        let html = render_page(&PageContext {
            title: "Fish & <Chips>",
            site_title: "Site",
            content: "",
            home: "index.html",
        });
        assert!(html.contains("Fish &amp; &lt;Chips&gt;"));
    }

    #[test]
    fn test_home_page_title_is_not_repeated() {
        let html = render_page(&PageContext {
            title: "Site",
            site_title: "Site",
            content: "",
            home: "index.html",
        });
        assert!(html.contains("<title>Site</title>"));
    }

    #[test]
    fn test_home_link_depth() {
        assert_eq!(home_link("index.html"), "index.html");
        assert_eq!(home_link("posts/a.html"), "../index.html");
        assert_eq!(home_link("a/b/c.html"), "../../index.html");
    }
}
