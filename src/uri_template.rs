//! URI template matching and expansion
//!
//! Templates use simple `{var}` placeholders plus a `{var*}` form that also
//! matches path separators:
//!
//! - `{var}` matches any non-slash characters (`[^/]+`)
//! - `{var*}` matches any characters (`.+`)
//!
//! Captured values are percent-decoded. Query parameters in a template
//! (`notes://{id}?fields={fields}`) contribute additional variables when the
//! concrete URI carries them; they are optional.
//!
//! # Example
//!
//! ```rust
//! use beacon_mcp::uri_template;
//!
//! let vars = uri_template::matches("users://42", "users://{id}").unwrap();
//! assert_eq!(vars["id"], "42");
//!
//! let uri = uri_template::expand("users://{id}", &[("id", "a b")].into_iter()
//!     .map(|(k, v)| (k.to_string(), v.to_string()))
//!     .collect());
//! assert_eq!(uri, "users://a%20b");
//! ```

use std::collections::HashMap;

use regex::Regex;

/// Detect whether a string contains a `{…}` placeholder.
pub fn is_template(s: &str) -> bool {
    match (s.find('{'), s.find('}')) {
        (Some(open), Some(close)) => open < close,
        _ => false,
    }
}

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    pattern: Regex,
    variables: Vec<String>,
    query_vars: Vec<(String, String)>,
}

impl UriTemplate {
    /// Compile a template. Panics on a malformed pattern; templates are
    /// written by the application at registration time.
    pub fn parse(template: &str) -> Self {
        let (path_part, query_part) = split_query(template);

        let mut pattern = String::from("^");
        let mut variables = Vec::new();
        let mut chars = path_part.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '{' {
                let body: String = chars.by_ref().take_while(|&c| c != '}').collect();
                if let Some(name) = body.strip_suffix('*') {
                    variables.push(name.to_string());
                    pattern.push_str("(.+)");
                } else {
                    variables.push(body);
                    pattern.push_str("([^/]+)");
                }
            } else {
                push_escaped(&mut pattern, c);
            }
        }
        pattern.push('$');

        let query_vars = query_part
            .map(|q| {
                q.split('&')
                    .filter_map(|pair| {
                        let (key, value) = pair.split_once('=')?;
                        let var = value.strip_prefix('{')?.strip_suffix('}')?;
                        let var = var.strip_suffix('*').unwrap_or(var);
                        Some((key.to_string(), var.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let pattern = Regex::new(&pattern)
            .unwrap_or_else(|e| panic!("Invalid URI template '{}': {}", template, e));

        Self {
            raw: template.to_string(),
            pattern,
            variables,
            query_vars,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a concrete URI, returning the captured variables percent-decoded.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let (path_part, query_part) = split_query(uri);
        let captures = self.pattern.captures(path_part)?;

        let mut vars: HashMap<String, String> = self
            .variables
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                captures
                    .get(i + 1)
                    .map(|m| (name.clone(), percent_decode(m.as_str())))
            })
            .collect();

        if !self.query_vars.is_empty() {
            let query = parse_query(query_part.unwrap_or(""));
            for (key, var) in &self.query_vars {
                if let Some(value) = query.get(key) {
                    vars.insert(var.clone(), value.clone());
                }
            }
        }

        Some(vars)
    }
}

/// Match a concrete URI against a template string.
pub fn matches(uri: &str, template: &str) -> Option<HashMap<String, String>> {
    UriTemplate::parse(template).matches(uri)
}

/// Expand a template with parameters. Substitutions are percent-encoded;
/// missing parameters yield an empty substitution.
pub fn expand(template: &str, params: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let body: String = chars.by_ref().take_while(|&c| c != '}').collect();
            let name = body.strip_suffix('*').unwrap_or(&body);
            if let Some(value) = params.get(name) {
                out.push_str(&percent_encode(value));
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn split_query(s: &str) -> (&str, Option<&str>) {
    match s.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (s, None),
    }
}

pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((percent_decode(key), percent_decode(value)))
        })
        .collect()
}

fn push_escaped(pattern: &mut String, c: char) {
    match c {
        '.' | '+' | '*' | '?' | '^' | '$' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\' => {
            pattern.push('\\');
            pattern.push(c);
        }
        _ => pattern.push(c),
    }
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_templates() {
        assert!(is_template("users://{id}"));
        assert!(is_template("file:///{path*}"));
        assert!(!is_template("users://42"));
        assert!(!is_template("oops}{"));
    }

    #[test]
    fn matches_simple_variable() {
        let vars = matches("users://42", "users://{id}").unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars["id"], "42");
    }

    #[test]
    fn simple_variable_stops_at_slash() {
        assert!(matches("users://1/2", "users://{id}").is_none());
    }

    #[test]
    fn star_variable_spans_slashes() {
        let vars = matches("file:///docs/a/b.txt", "file:///{path*}").unwrap();
        assert_eq!(vars["path"], "docs/a/b.txt");
    }

    #[test]
    fn multiple_variables() {
        let vars = matches("api://v1/users/9", "api://v1/{resource}/{id}").unwrap();
        assert_eq!(vars["resource"], "users");
        assert_eq!(vars["id"], "9");
    }

    #[test]
    fn missing_segment_does_not_match() {
        assert!(matches("api://v1/users", "api://v1/{resource}/{id}").is_none());
    }

    #[test]
    fn captures_are_percent_decoded() {
        let vars = matches("notes://a%20b", "notes://{title}").unwrap();
        assert_eq!(vars["title"], "a b");
    }

    #[test]
    fn query_parameters_are_optional() {
        let template = "notes://{id}?fields={fields}";
        let with = matches("notes://7?fields=title", template).unwrap();
        assert_eq!(with["id"], "7");
        assert_eq!(with["fields"], "title");

        let without = matches("notes://7", template).unwrap();
        assert_eq!(without["id"], "7");
        assert!(!without.contains_key("fields"));
    }

    #[test]
    fn expand_encodes_substitutions() {
        let params: HashMap<String, String> =
            [("id".to_string(), "a/b c".to_string())].into_iter().collect();
        assert_eq!(expand("users://{id}", &params), "users://a%2Fb%20c");
    }

    #[test]
    fn expand_missing_param_is_empty() {
        let params = HashMap::new();
        assert_eq!(expand("users://{id}/x", &params), "users:///x");
    }

    #[test]
    fn expand_then_match_round_trips() {
        let template = "api://v1/{resource}/{id}";
        let params: HashMap<String, String> = [
            ("resource".to_string(), "user files".to_string()),
            ("id".to_string(), "4/2".to_string()),
        ]
        .into_iter()
        .collect();
        let uri = expand(template, &params);
        let back = matches(&uri, template).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn literal_regex_characters_are_escaped() {
        assert!(matches("files://a_txt", "files://{name}.txt").is_none());
        let vars = matches("files://a.txt", "files://{name}.txt").unwrap();
        assert_eq!(vars["name"], "a");
    }
}
