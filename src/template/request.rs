use std::path::Path;
use crate::errors::ProbeError;
use tracing::debug;

/// Literal token marking the injection point in a template.
pub const MARKER: &str = "FUZZ";

/// A stored HTTP request with one or more injection markers.
///
/// Parsed either from a raw request file (the format proxies such as Burp
/// export) or from a `--target` URL. Headers and cookies keep the order they
/// appeared in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub host: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: String,
    /// Set when the template came from a URL; request files derive it.
    scheme: Option<String>,
}

/// A template with every marker substituted, ready to hand to a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub body: String,
    pub content_type: Option<String>,
    pub cookies: Vec<(String, String)>,
}

impl PreparedRequest {
    /// Only non-GET requests go through the synthetic submit document.
    pub fn needs_submit(&self) -> bool {
        !self.method.eq_ignore_ascii_case("GET")
    }

    /// `scheme://host[:port]` of the request URL, used for cookie seeding.
    pub fn origin(&self) -> String {
        origin_of(&self.url)
    }

    /// Host without port, the cookie domain.
    pub fn cookie_domain(&self) -> String {
        let origin = self.origin();
        let host_port = origin.splitn(2, "://").nth(1).unwrap_or(&origin);
        host_port.split(':').next().unwrap_or(host_port).to_string()
    }
}

impl RequestTemplate {
    /// Parse a raw request description.
    ///
    /// The first line is `METHOD PATH [PROTOCOL]`, then `Name: value` headers
    /// until a blank line, then the body. With `require_marker` the template
    /// must carry [`MARKER`] in its path or body.
    pub fn parse(content: &str, require_marker: bool) -> Result<Self, ProbeError> {
        let lines: Vec<&str> = content
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();

        let request_line = lines.first().map(|l| l.trim()).unwrap_or("");
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 {
            return Err(ProbeError::Config(format!(
                "Malformed request line: '{}'",
                request_line
            )));
        }

        let mut template = RequestTemplate {
            method: parts[0].to_uppercase(),
            path: parts[1].to_string(),
            protocol: parts.get(2).unwrap_or(&"HTTP/1.1").to_string(),
            host: String::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: String::new(),
            scheme: None,
        };

        let mut i = 1;
        while i < lines.len() && !lines[i].trim().is_empty() {
            if let Some((key, value)) = lines[i].split_once(':') {
                let key = key.trim().to_string();
                let value = value.trim().to_string();
                if key.eq_ignore_ascii_case("host") {
                    template.host = value.clone();
                } else if key.eq_ignore_ascii_case("cookie") {
                    template.cookies.extend(parse_cookie_header(&value));
                }
                template.headers.push((key, value));
            }
            i += 1;
        }

        if i + 1 < lines.len() {
            template.body = lines[i + 1..].join("\n").trim().to_string();
        }

        if template.host.is_empty() {
            return Err(ProbeError::Config("Request has no Host header".into()));
        }
        if require_marker && !template.has_marker() {
            return Err(ProbeError::Config(format!(
                "Request must contain the '{}' marker in its path or body",
                MARKER
            )));
        }

        debug!(method = %template.method, host = %template.host, path = %template.path, "Parsed request template");
        Ok(template)
    }

    pub async fn from_file(path: &Path, require_marker: bool) -> Result<Self, ProbeError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProbeError::Config(format!("Cannot read request file {}: {}", path.display(), e))
        })?;
        Self::parse(&content, require_marker)
    }

    /// Build a GET template from a URL carrying the marker.
    pub fn from_target_url(url: &str) -> Result<Self, ProbeError> {
        if !url.contains(MARKER) {
            return Err(ProbeError::Config(format!(
                "Target URL must contain the '{}' marker (e.g. https://target.com/search?q={})",
                MARKER, MARKER
            )));
        }
        let (scheme, rest) = url.split_once("://").ok_or_else(|| {
            ProbeError::Config(format!("Target URL has no scheme: {}", url))
        })?;
        let split_at = rest.find(|c: char| matches!(c, '/' | '?' | '#')).unwrap_or(rest.len());
        let host = &rest[..split_at];
        if host.is_empty() {
            return Err(ProbeError::Config(format!("Target URL has no host: {}", url)));
        }
        let path = match &rest[split_at..] {
            "" => "/".to_string(),
            p if p.starts_with('/') => p.to_string(),
            p => format!("/{}", p),
        };

        Ok(RequestTemplate {
            method: "GET".to_string(),
            path,
            protocol: "HTTP/1.1".to_string(),
            host: host.to_string(),
            headers: vec![("Host".to_string(), host.to_string())],
            cookies: Vec::new(),
            body: String::new(),
            scheme: Some(scheme.to_lowercase()),
        })
    }

    pub fn has_marker(&self) -> bool {
        self.path.contains(MARKER) || self.body.contains(MARKER)
    }

    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `scheme://host` for this template.
    pub fn base_url(&self) -> String {
        let scheme = match &self.scheme {
            Some(s) => s.clone(),
            None => {
                let https = self.protocol.starts_with("HTTP/2")
                    || self.host.ends_with(":443")
                    || self.path.contains("https");
                if https { "https".to_string() } else { "http".to_string() }
            }
        };
        let host = match (scheme.as_str(), self.host.rsplit_once(':')) {
            ("https", Some((h, "443"))) => h,
            _ => self.host.as_str(),
        };
        format!("{}://{}", scheme, host)
    }

    /// `METHOD PATH`, how a finding refers to the request that planted it.
    pub fn descriptor(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Replace every marker occurrence in path and body with `payload`.
    pub fn substitute(&self, payload: &str) -> PreparedRequest {
        PreparedRequest {
            method: self.method.clone(),
            url: format!("{}{}", self.base_url(), self.path.replace(MARKER, payload)),
            body: self.body.replace(MARKER, payload),
            content_type: self.header("Content-Type").map(|v| v.to_string()),
            cookies: self.cookies.clone(),
        }
    }

    /// The template as-is, for secondary pages that carry no marker.
    pub fn prepare(&self) -> PreparedRequest {
        PreparedRequest {
            method: self.method.clone(),
            url: format!("{}{}", self.base_url(), self.path),
            body: self.body.clone(),
            content_type: self.header("Content-Type").map(|v| v.to_string()),
            cookies: self.cookies.clone(),
        }
    }
}

fn parse_cookie_header(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

pub(crate) fn origin_of(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let end = rest.find(|c: char| matches!(c, '/' | '?' | '#')).unwrap_or(rest.len());
            format!("{}://{}", scheme, &rest[..end])
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST_FORM: &str = "POST /comment HTTP/1.1\r\n\
Host: shop.example:8080\r\n\
Content-Type: application/x-www-form-urlencoded\r\n\
Cookie: session=abc123; theme=dark\r\n\
\r\n\
name=bob&text=FUZZ\r\n";

    #[test]
    fn test_parse_request_file() {
        let t = RequestTemplate::parse(POST_FORM, true).unwrap();
        assert_eq!(t.method, "POST");
        assert_eq!(t.path, "/comment");
        assert_eq!(t.protocol, "HTTP/1.1");
        assert_eq!(t.host, "shop.example:8080");
        assert_eq!(t.body, "name=bob&text=FUZZ");
        assert_eq!(
            t.cookies,
            vec![
                ("session".to_string(), "abc123".to_string()),
                ("theme".to_string(), "dark".to_string())
            ]
        );
        assert_eq!(t.header("content-type"), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn test_missing_marker_rejected() {
        let raw = "GET /profile HTTP/1.1\nHost: a.example\n\n";
        let err = RequestTemplate::parse(raw, true).unwrap_err();
        assert!(matches!(err, ProbeError::Config(_)));
        assert!(RequestTemplate::parse(raw, false).is_ok());
    }

    #[test]
    fn test_substitute_replaces_every_marker() {
        let raw = "GET /search?q=FUZZ&mode=FUZZ HTTP/1.1\nHost: a.example\n\n";
        let t = RequestTemplate::parse(raw, true).unwrap();
        let prepared = t.substitute("X");
        assert_eq!(prepared.url, "http://a.example/search?q=X&mode=X");
    }

    #[test]
    fn test_substitute_body() {
        let t = RequestTemplate::parse(POST_FORM, true).unwrap();
        let prepared = t.substitute("<b>");
        assert_eq!(prepared.body, "name=bob&text=<b>");
        assert_eq!(prepared.url, "http://shop.example:8080/comment");
        assert!(prepared.needs_submit());
        assert_eq!(prepared.cookie_domain(), "shop.example");
        assert_eq!(prepared.origin(), "http://shop.example:8080");
    }

    #[test]
    fn test_base_url_http2_is_https() {
        let raw = "GET /x?q=FUZZ HTTP/2\nHost: secure.example:443\n\n";
        let t = RequestTemplate::parse(raw, true).unwrap();
        assert_eq!(t.base_url(), "https://secure.example");
    }

    #[test]
    fn test_base_url_keeps_non_443_ports() {
        let t = RequestTemplate::parse("GET /?q=FUZZ HTTP/1.1\nHost: plain.example:80\n\n", true).unwrap();
        assert_eq!(t.base_url(), "http://plain.example:80");
        let t = RequestTemplate::parse("GET /?q=FUZZ HTTP/1.1\nHost: alt.example:8443\n\n", true).unwrap();
        assert_eq!(t.base_url(), "http://alt.example:8443");
    }

    #[test]
    fn test_from_target_url() {
        let t = RequestTemplate::from_target_url("https://t.example/search?q=FUZZ").unwrap();
        assert_eq!(t.method, "GET");
        assert_eq!(t.path, "/search?q=FUZZ");
        assert_eq!(t.substitute("1").url, "https://t.example/search?q=1");
        assert!(!t.substitute("1").needs_submit());
    }

    #[test]
    fn test_from_target_url_without_marker() {
        assert!(RequestTemplate::from_target_url("https://t.example/").is_err());
    }

    #[test]
    fn test_descriptor() {
        let t = RequestTemplate::parse(POST_FORM, true).unwrap();
        assert_eq!(t.descriptor(), "POST /comment");
    }

    #[test]
    fn test_malformed_request_line() {
        assert!(RequestTemplate::parse("GARBAGE\nHost: a\n", false).is_err());
    }
}
