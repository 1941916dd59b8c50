//! Synthetic documents that let a browser perform non-GET requests.
//!
//! The browser loads one of these in place of a navigation; the document
//! issues the request itself and the response ends up rendered in the same
//! tab, where detection reads it like any other page.

use crate::template::PreparedRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    Raw,
}

impl BodyKind {
    /// Content type wins; without one the body shape decides.
    pub fn detect(content_type: Option<&str>, body: &str) -> Self {
        let ct = content_type.unwrap_or_default().to_ascii_lowercase();
        if ct.contains("application/json") {
            return Self::Json;
        }
        if ct.contains("application/x-www-form-urlencoded") {
            return Self::Form;
        }
        if !ct.is_empty() {
            return Self::Raw;
        }
        let trimmed = body.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            Self::Json
        } else if body.contains('=') {
            Self::Form
        } else {
            Self::Raw
        }
    }
}

pub fn build_submit_document(request: &PreparedRequest) -> String {
    let kind = BodyKind::detect(request.content_type.as_deref(), &request.body);
    let is_post = request.method.eq_ignore_ascii_case("POST");
    match kind {
        // HTML forms can only send GET and POST
        BodyKind::Form if is_post => form_document(request),
        BodyKind::Json => fetch_document(request, "application/json"),
        _ => {
            let ct = request
                .content_type
                .clone()
                .unwrap_or_else(|| "text/plain".to_string());
            fetch_document(request, &ct)
        }
    }
}

fn form_document(request: &PreparedRequest) -> String {
    let fields: String = request
        .body
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
                escape_attr(name),
                escape_attr(value)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<!DOCTYPE html>\n<html><body>\n<form id=\"probe\" method=\"POST\" action=\"{}\">\n{}\n</form>\n<script>document.getElementById('probe').submit();</script>\n</body></html>",
        escape_attr(&request.url),
        fields
    )
}

fn fetch_document(request: &PreparedRequest, content_type: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><body>\n<script>\n\
fetch({url}, {{method: {method}, headers: {{'Content-Type': {ct}}}, body: {body}, credentials: 'include'}})\n\
  .then(function (r) {{ return r.text(); }})\n\
  .then(function (html) {{ document.open(); document.write(html); document.close(); }})\n\
  .catch(function (e) {{ document.body.setAttribute('data-probe-error', String(e)); }});\n\
</script>\n</body></html>",
        url = js_string(&request.url),
        method = js_string(&request.method.to_ascii_uppercase()),
        ct = js_string(content_type),
        body = js_string(&request.body),
    )
}

/// JSON string literal that is also safe inside an inline `<script>`.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace("</", "<\\/")
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
