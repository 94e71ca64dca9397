use std::sync::OnceLock;

use regex::Regex;

static SCHEME_PREFIX: OnceLock<Regex> = OnceLock::new();

/// Derives the bare domain an article was published under, e.g.
/// `https://www.ansa.it/news/1` becomes `ansa.it`.
///
/// No validation is done: anything that is not a URL degrades to its first
/// `/`-separated token, which may be empty.
pub fn extract_domain(url: &str) -> String {
    let prefix = SCHEME_PREFIX.get_or_init(|| {
        Regex::new(r"^https?://(www\.)?").expect("scheme prefix pattern is valid")
    });
    let stripped = prefix.replace(url, "");
    stripped.split('/').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_www() {
        assert_eq!(extract_domain("https://www.example.com/path/to/article"), "example.com");
        assert_eq!(extract_domain("https://www.ansa.it/news/1"), "ansa.it");
    }

    #[test]
    fn plain_http_without_www() {
        assert_eq!(extract_domain("http://example.org/x"), "example.org");
        assert_eq!(extract_domain("https://edition.cnn.com"), "edition.cnn.com");
    }

    #[test]
    fn no_scheme_keeps_first_segment() {
        assert_eq!(extract_domain("example.net/a/b"), "example.net");
        assert_eq!(extract_domain("www.example.net/a"), "www.example.net");
    }

    #[test]
    fn malformed_input_degrades() {
        assert_eq!(extract_domain(""), "");
        assert_eq!(extract_domain("/leading/slash"), "");
        assert_eq!(extract_domain("ftp://host/x"), "ftp:");
        assert_eq!(extract_domain("https://"), "");
    }

    #[test]
    fn only_a_leading_scheme_is_stripped() {
        assert_eq!(
            extract_domain("news.example.com/redirect?to=https://www.other.com"),
            "news.example.com"
        );
    }
}
