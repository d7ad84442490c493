//! Plain-text fallback for html-only messages.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HIDDEN_BLOCKS: Regex = Regex::new(r"(?is)<(script|style|head)[^>]*>.*?</(script|style|head)>").unwrap();
    static ref TAGS: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Strip markup, decode common entities and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let text = HIDDEN_BLOCKS.replace_all(html, " ");
    let text = TAGS.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" decodes to "&lt;" rather than "<"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags_and_collapse() {
        let html = "<h1>Welcome</h1>\n<p>Hi <b>Sam</b>,</p>   <p>See you soon.</p>";
        assert_eq!(strip_html(html), "Welcome Hi Sam , See you soon.");
    }

    #[test]
    fn test_hidden_blocks_removed() {
        let html = "<style>p { color: red; }</style><p>Body</p><script>alert(1)</script>";
        assert_eq!(strip_html(html), "Body");
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(strip_html("Fish &amp; Chips&nbsp;&lt;3"), "Fish & Chips <3");
        assert_eq!(strip_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_empty() {
        assert_eq!(strip_html(""), "");
        assert_eq!(strip_html("<br/>"), "");
    }
}
