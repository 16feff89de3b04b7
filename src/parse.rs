//! HTML cleaning and text extraction

use scraper::{Html, Selector};
use url::Url;

/// Elements whose content is boilerplate, not page text
const BOILERPLATE_SELECTORS: &[&str] = &["script", "style", "nav", "header", "footer", "aside", "form"];

/// A page reduced to its visible content
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Document title, if present
    pub title: Option<String>,

    /// Cleaned visible text with normalized whitespace
    pub text: String,

    /// Absolute outbound link URLs
    pub links: Vec<String>,
}

/// Parse HTML content, strip boilerplate, and extract text and links
pub fn parse_html(content: &str, base_url: Option<&str>) -> ParsedPage {
    let document = Html::parse_document(content);
    let mut page = ParsedPage::default();

    if let Ok(selector) = Selector::parse("title") {
        if let Some(title_elem) = document.select(&selector).next() {
            let title = title_elem.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                page.title = Some(title);
            }
        }
    }

    // Prefer the main content region when one is marked up
    let root_html = ["main", "article", "body"]
        .iter()
        .filter_map(|name| Selector::parse(name).ok())
        .find_map(|s| document.select(&s).next().map(|e| e.html()))
        .unwrap_or_else(|| content.to_string());

    // Drop boilerplate elements by erasing their serialized form
    let mut cleaned = root_html;
    for name in BOILERPLATE_SELECTORS {
        if let Ok(selector) = Selector::parse(name) {
            for elem in document.select(&selector) {
                let fragment = elem.html();
                if !fragment.is_empty() {
                    cleaned = cleaned.replace(&fragment, "");
                }
            }
        }
    }

    let text = html2text::from_read(cleaned.as_bytes(), 80).unwrap_or_else(|_| cleaned.clone());
    page.text = normalize_whitespace(&text);

    // Extract links, resolved against the base URL
    if let Ok(selector) = Selector::parse("a[href]") {
        let base = base_url.and_then(|u| Url::parse(u).ok());

        for elem in document.select(&selector) {
            if let Some(href) = elem.value().attr("href") {
                let resolved = if let Some(ref base) = base {
                    match base.join(href) {
                        Ok(u) => u.to_string(),
                        Err(_) => continue,
                    }
                } else {
                    href.to_string()
                };
                page.links.push(resolved);
            }
        }
    }

    page
}

/// Normalize whitespace: collapse runs, preserve paragraph breaks
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_whitespace = true;
    let mut newline_count = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                newline_count += 1;
            }
            last_was_whitespace = true;
        } else {
            if last_was_whitespace && !result.is_empty() {
                if newline_count >= 2 {
                    result.push_str("\n\n");
                } else if newline_count == 1 {
                    result.push('\n');
                } else {
                    result.push(' ');
                }
            }
            result.push(c);
            last_was_whitespace = false;
            newline_count = 0;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_html_basic() {
        let html = r#"
        <!DOCTYPE html>
        <html>
        <head><title>Test Page</title></head>
        <body>
            <h1>Main Heading</h1>
            <p>Some paragraph text here.</p>
            <a href="/other">Link</a>
        </body>
        </html>
        "#;

        let page = parse_html(html, Some("https://example.com"));

        assert_eq!(page.title, Some("Test Page".to_string()));
        assert!(page.text.contains("Main Heading"));
        assert!(page.text.contains("paragraph text"));
    }

    #[test]
    fn test_boilerplate_stripped() {
        let html = r#"
        <html>
        <body>
            <nav><a href="/home">Home</a> navigation menu</nav>
            <script>var tracking = "analytics-code";</script>
            <style>.hidden { display: none; }</style>
            <p>Actual content survives.</p>
            <footer>Copyright notice</footer>
        </body>
        </html>
        "#;

        let page = parse_html(html, None);

        assert!(page.text.contains("Actual content survives"));
        assert!(!page.text.contains("navigation menu"));
        assert!(!page.text.contains("analytics-code"));
        assert!(!page.text.contains("Copyright notice"));
    }

    #[test]
    fn test_link_resolution() {
        let html = r#"
        <html>
        <body>
            <a href="/docs/intro">Internal</a>
            <a href="https://external.com/page">External</a>
            <a href="relative/path">Relative</a>
        </body>
        </html>
        "#;

        let page = parse_html(html, Some("https://example.com/docs/"));

        assert_eq!(page.links.len(), 3);
        assert!(page.links.contains(&"https://example.com/docs/intro".to_string()));
        assert!(page.links.contains(&"https://external.com/page".to_string()));
        assert!(page.links.contains(&"https://example.com/docs/relative/path".to_string()));
    }

    #[test]
    fn test_main_region_preferred() {
        let html = r#"
        <html>
        <body>
            <div>Sidebar cruft</div>
            <main><p>The article body.</p></main>
        </body>
        </html>
        "#;

        let page = parse_html(html, None);

        assert!(page.text.contains("The article body"));
        assert!(!page.text.contains("Sidebar cruft"));
    }

    #[test]
    fn test_empty_page() {
        let page = parse_html("<html><body>   \n  </body></html>", None);
        assert!(page.text.trim().is_empty());
        assert!(page.title.is_none());
    }

    #[test]
    fn test_normalize_whitespace() {
        let input = "Hello   world\n\n\n\ntest";
        let result = normalize_whitespace(input);
        assert_eq!(result, "Hello world\n\ntest");
    }
}
