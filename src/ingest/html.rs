//! HTML to text conversion.
//!
//! Strips chrome elements (script/style/nav/header/footer and friends) and
//! flattens the remainder into newline-separated text suitable for chunking.
//! Also extracts same-document outlinks for the crawler.

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Elements whose entire subtree is dropped during conversion.
const STRIPPED_ELEMENTS: [&str; 8] = [
    "script", "style", "nav", "header", "footer", "noscript", "iframe", "aside",
];

/// Elements that end a text block.
const BLOCK_ELEMENTS: [&str; 15] = [
    "p", "div", "section", "article", "li", "tr", "br", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "pre",
];

/// Convert an HTML document into plain text.
///
/// Returns an empty string when the document has no textual content left
/// after stripping.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    if let Ok(body) = Selector::parse("body") {
        if let Some(root) = document.select(&body).next() {
            collect_text(root, &mut out);
        }
    }

    normalize_whitespace(&out)
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if STRIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if BLOCK_ELEMENTS.contains(&name) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of blank lines and intra-line whitespace.
fn normalize_whitespace(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !lines.last().map(|l: &String| l.is_empty()).unwrap_or(true) {
                lines.push(String::new());
            }
        } else {
            lines.push(collapsed);
        }
    }
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

/// Extract absolute same-document links from anchors, resolved against `base`.
///
/// Fragments are dropped so `/about#team` and `/about` dedup to one URL.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("mailto:") {
            continue;
        }
        if let Ok(mut resolved) = base.join(href) {
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            resolved.set_fragment(None);
            links.push(resolved);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_style_and_chrome() {
        let html = r#"
            <html><head><style>body { color: red; }</style></head>
            <body>
                <nav>Home | About</nav>
                <header>Site header</header>
                <h1>Welcome</h1>
                <p>This is the real content.</p>
                <script>var tracking = true;</script>
                <footer>Copyright 2026</footer>
            </body></html>
        "#;
        let text = html_to_text(html);
        assert!(text.contains("Welcome"));
        assert!(text.contains("real content"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("Home | About"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn block_elements_become_line_breaks() {
        let html = "<body><p>First paragraph.</p><p>Second paragraph.</p></body>";
        let text = html_to_text(html);
        assert_eq!(text, "First paragraph.\nSecond paragraph.");
    }

    #[test]
    fn empty_page_yields_empty_text() {
        let html = "<body><script>nothing()</script></body>";
        assert!(html_to_text(html).is_empty());
    }

    #[test]
    fn links_resolve_and_drop_fragments() {
        let base = Url::parse("https://example.com/docs/intro").unwrap();
        let html = r##"<body>
            <a href="/about#team">About</a>
            <a href="guide">Guide</a>
            <a href="https://other.com/page">External</a>
            <a href="mailto:hi@example.com">Mail</a>
            <a href="#section">Anchor</a>
        </body>"##;

        let links = extract_links(html, &base);
        let as_strings: Vec<String> = links.iter().map(|u| u.to_string()).collect();
        assert!(as_strings.contains(&"https://example.com/about".to_string()));
        assert!(as_strings.contains(&"https://example.com/docs/guide".to_string()));
        assert!(as_strings.contains(&"https://other.com/page".to_string()));
        assert_eq!(as_strings.len(), 3);
    }
}
