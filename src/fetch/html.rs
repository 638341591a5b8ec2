//! Stylesheet discovery from a fetched HTML document (spec §4.1), in
//! document order. Grounded on the `scraper`/`html5ever` stack.

use scraper::{Html, Selector};

/// Everything discoverable about CSS sources from one HTML document,
/// in the order they appear (cascade order downstream).
#[derive(Debug, Clone, Default)]
pub struct DiscoveredCss {
    /// `href` values of `<link rel="stylesheet">` elements, in document order.
    pub stylesheet_urls: Vec<String>,
    /// Concatenated `<style>` block bodies, in document order.
    pub style_blocks: Vec<String>,
    /// `style="..."` attribute values found on any element, in document order.
    pub inline_style_attrs: Vec<String>,
    /// `<title>` text, if present.
    pub title: Option<String>,
    /// `<meta name="description">` content, if present.
    pub description: Option<String>,
    /// Resolved favicon URL (`<link rel="icon">`), if present.
    pub favicon: Option<String>,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Walks `html` once and collects every stylesheet source plus the display
/// metadata the Site row caches (title/description/favicon).
pub fn discover(html: &str) -> DiscoveredCss {
    let document = Html::parse_document(html);
    let mut result = DiscoveredCss::default();

    let link_sel = selector(r#"link[rel="stylesheet"]"#);
    for el in document.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            result.stylesheet_urls.push(href.to_string());
        }
    }

    let style_sel = selector("style");
    for el in document.select(&style_sel) {
        result.style_blocks.push(el.text().collect::<String>());
    }

    let any_sel = selector("[style]");
    for el in document.select(&any_sel) {
        if let Some(style) = el.value().attr("style") {
            result.inline_style_attrs.push(style.to_string());
        }
    }

    let title_sel = selector("title");
    result.title = document.select(&title_sel).next().map(|el| el.text().collect::<String>());

    let desc_sel = selector(r#"meta[name="description"]"#);
    result.description =
        document.select(&desc_sel).next().and_then(|el| el.value().attr("content")).map(str::to_string);

    let icon_sel = selector(r#"link[rel~="icon"]"#);
    result.favicon =
        document.select(&icon_sel).next().and_then(|el| el.value().attr("href")).map(str::to_string);

    result
}

/// Synthesizes a computed-style CSS body from collected inline attributes,
/// one synthetic selector per style attribute. This is the bounded,
/// browser-free stand-in for a real computed-style render (spec §4.1).
pub fn synthesize_computed_css(inline_style_attrs: &[String]) -> String {
    let mut out = String::new();
    for (i, decls) in inline_style_attrs.iter().enumerate() {
        out.push_str(&format!(".motif-computed-{i} {{ {decls} }}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_stylesheets_in_document_order() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/a.css">
            <style>.x { color: red; }</style>
            <link rel="stylesheet" href="/b.css">
        </head><body style="color: blue;"></body></html>"#;
        let discovered = discover(html);
        assert_eq!(discovered.stylesheet_urls, vec!["/a.css", "/b.css"]);
        assert_eq!(discovered.style_blocks.len(), 1);
        assert_eq!(discovered.inline_style_attrs, vec!["color: blue;"]);
    }

    #[test]
    fn captures_title_description_and_favicon() {
        let html = r#"<html><head>
            <title>Example</title>
            <meta name="description" content="An example site">
            <link rel="icon" href="/favicon.ico">
        </head><body></body></html>"#;
        let discovered = discover(html);
        assert_eq!(discovered.title.as_deref(), Some("Example"));
        assert_eq!(discovered.description.as_deref(), Some("An example site"));
        assert_eq!(discovered.favicon.as_deref(), Some("/favicon.ico"));
    }

    #[test]
    fn synthesizes_one_rule_per_inline_attribute() {
        let css = synthesize_computed_css(&["color: red;".to_string(), "margin: 4px;".to_string()]);
        assert!(css.contains(".motif-computed-0"));
        assert!(css.contains(".motif-computed-1"));
    }
}
