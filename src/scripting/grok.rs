//! Grok pattern expansion.
//!
//! `%{NAME}` expands to a pattern from the built-in table, `%{NAME:field}`
//! additionally captures the match into `field`, and `%{NAME:field:type}`
//! converts the capture to `int`, `float`, `bool` or `str`. Patterns are
//! expanded into a single `regex::Regex` when a script is compiled.

use crate::point::Value;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const MAX_DEPTH: usize = 16;

const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("USERNAME", r"[a-zA-Z0-9._-]+"),
    ("USER", r"%{USERNAME}"),
    ("INT", r"(?:[+-]?(?:[0-9]+))"),
    ("BASE10NUM", r"(?:[+-]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+))"),
    ("NUMBER", r"(?:%{BASE10NUM})"),
    ("BASE16NUM", r"(?:0[xX]?[0-9a-fA-F]+)"),
    ("POSINT", r"\b(?:[1-9][0-9]*)\b"),
    ("NONNEGINT", r"\b(?:[0-9]+)\b"),
    ("WORD", r"\b\w+\b"),
    ("NOTSPACE", r"\S+"),
    ("SPACE", r"\s*"),
    ("DATA", r".*?"),
    ("GREEDYDATA", r".*"),
    ("QUOTEDSTRING", r#"(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#),
    ("QS", r"%{QUOTEDSTRING}"),
    ("UUID", r"[A-Fa-f0-9]{8}-(?:[A-Fa-f0-9]{4}-){3}[A-Fa-f0-9]{12}"),
    (
        "IPV4",
        r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)",
    ),
    ("IPV6", r"(?:[0-9A-Fa-f]{0,4}:){2,7}[0-9A-Fa-f]{0,4}"),
    ("IP", r"(?:%{IPV6}|%{IPV4})"),
    (
        "HOSTNAME",
        r"\b(?:[0-9A-Za-z][0-9A-Za-z-]{0,62})(?:\.(?:[0-9A-Za-z][0-9A-Za-z-]{0,62}))*\.?\b",
    ),
    ("IPORHOST", r"(?:%{IP}|%{HOSTNAME})"),
    ("HOSTPORT", r"%{IPORHOST}:%{POSINT}"),
    ("PATH", r"(?:/[^\s]*)+"),
    ("URIPATH", r"(?:/[A-Za-z0-9$.+!*'(){},~:;=@#%&_\-]*)+"),
    ("URIPARAM", r"\?[A-Za-z0-9$.+!*'|(){},~@#%&/=:;_?\-\[\]<>]*"),
    ("URIPATHPARAM", r"%{URIPATH}(?:%{URIPARAM})?"),
    (
        "MONTH",
        r"\b(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\b",
    ),
    ("MONTHNUM", r"(?:0?[1-9]|1[0-2])"),
    ("MONTHDAY", r"(?:(?:0[1-9])|(?:[12][0-9])|(?:3[01])|[1-9])"),
    ("YEAR", r"(?:\d\d){1,2}"),
    ("HOUR", r"(?:2[0123]|[01]?[0-9])"),
    ("MINUTE", r"(?:[0-5][0-9])"),
    ("SECOND", r"(?:(?:[0-5]?[0-9]|60)(?:[:.,][0-9]+)?)"),
    ("TIME", r"%{HOUR}:%{MINUTE}(?::%{SECOND})?"),
    ("ISO8601_TIMEZONE", r"(?:Z|[+-]%{HOUR}(?::?%{MINUTE}))"),
    (
        "TIMESTAMP_ISO8601",
        r"%{YEAR}-%{MONTHNUM}-%{MONTHDAY}[T ]%{HOUR}:?%{MINUTE}(?::?%{SECOND})?%{ISO8601_TIMEZONE}?",
    ),
    ("HTTPDATE", r"%{MONTHDAY}/%{MONTH}/%{YEAR}:%{TIME} %{INT}"),
    (
        "LOGLEVEL",
        r"(?i:alert|trace|debug|notice|info|warn(?:ing)?|err(?:or)?|crit(?:ical)?|fatal|severe|emerg(?:ency)?)",
    ),
];

fn builtin_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| BUILTIN_PATTERNS.iter().copied().collect())
}

fn reference_re() -> Result<&'static Regex, String> {
    static RE: OnceLock<Result<Regex, String>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"%\{(\w+)(?::([\w.\-\[\]@]+))?(?::(\w+))?\}").map_err(|e| e.to_string())
    })
    .as_ref()
    .map_err(Clone::clone)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrokType {
    Str,
    Int,
    Float,
    Bool,
}

impl GrokType {
    fn parse(s: &str) -> Result<Self, String> {
        Ok(match s {
            "str" | "string" => GrokType::Str,
            "int" => GrokType::Int,
            "float" => GrokType::Float,
            "bool" => GrokType::Bool,
            other => return Err(format!("unsupported grok type `{}`", other)),
        })
    }

    /// Convert a capture; unparsable captures stay strings
    fn convert(self, raw: &str) -> Value {
        let parsed = match self {
            GrokType::Str => None,
            GrokType::Int => raw.trim().parse::<i64>().ok().map(Value::Int),
            GrokType::Float => raw.trim().parse::<f64>().ok().map(Value::Float),
            GrokType::Bool => raw.trim().parse::<bool>().ok().map(Value::Bool),
        };
        parsed.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

#[derive(Debug, Clone)]
struct Capture {
    group: String,
    field: String,
    ty: GrokType,
}

/// A grok pattern compiled into one regex
#[derive(Debug, Clone)]
pub struct GrokPattern {
    regex: Regex,
    captures: Vec<Capture>,
}

impl GrokPattern {
    pub fn compile(pattern: &str) -> Result<Self, String> {
        let mut captures = Vec::new();
        let expanded = expand(pattern, &mut captures, 0)?;
        let regex = Regex::new(&format!("^{}$", expanded))
            .map_err(|e| format!("invalid grok pattern: {}", e))?;
        Ok(Self { regex, captures })
    }

    /// Named captures of a full match, converted to their declared types
    pub fn captures(&self, text: &str) -> Option<Vec<(String, Value)>> {
        let caps = self.regex.captures(text)?;
        Some(
            self.captures
                .iter()
                .filter_map(|c| {
                    caps.name(&c.group)
                        .map(|m| (c.field.clone(), c.ty.convert(m.as_str())))
                })
                .collect(),
        )
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

fn expand(pattern: &str, captures: &mut Vec<Capture>, depth: usize) -> Result<String, String> {
    if depth > MAX_DEPTH {
        return Err("grok pattern nesting too deep".to_string());
    }
    let re = reference_re()?;
    let mut out = String::with_capacity(pattern.len());
    let mut last = 0;
    for caps in re.captures_iter(pattern) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&pattern[last..whole.start()]);
        last = whole.end();

        let name = &caps[1];
        let body = builtin_table()
            .get(name)
            .ok_or_else(|| format!("unknown grok pattern `{}`", name))?;
        let inner = expand(body, captures, depth + 1)?;

        match caps.get(2) {
            Some(field) => {
                let ty = match caps.get(3) {
                    Some(t) => GrokType::parse(t.as_str())?,
                    None => GrokType::Str,
                };
                let group = format!("g{}", captures.len());
                out.push_str(&format!("(?P<{}>{})", group, inner));
                captures.push(Capture {
                    group,
                    field: field.as_str().to_string(),
                    ty,
                });
            }
            None => {
                out.push_str("(?:");
                out.push_str(&inner);
                out.push(')');
            }
        }
    }
    out.push_str(&pattern[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nginx_access_line() {
        let g = GrokPattern::compile(
            r#"%{IPORHOST:client_ip} %{NOTSPACE} %{NOTSPACE} \[%{HTTPDATE:time_local}\] "%{WORD:method} %{URIPATHPARAM:url} HTTP/%{NUMBER:http_version}" %{INT:status:int} %{INT:bytes:int}"#,
        )
        .unwrap();
        let fields = g
            .captures(r#"10.0.0.7 - - [12/Mar/2024:10:01:02 +0000] "GET /api?q=1 HTTP/1.1" 200 612"#)
            .unwrap();
        let map: HashMap<_, _> = fields.into_iter().collect();
        assert_eq!(map["client_ip"], Value::from("10.0.0.7"));
        assert_eq!(map["method"], Value::from("GET"));
        assert_eq!(map["url"], Value::from("/api?q=1"));
        assert_eq!(map["status"], Value::Int(200));
        assert_eq!(map["bytes"], Value::Int(612));
    }

    #[test]
    fn test_no_match() {
        let g = GrokPattern::compile("%{INT:n}").unwrap();
        assert!(g.captures("abc").is_none());
    }

    #[test]
    fn test_conversion_failure_keeps_string() {
        assert_eq!(GrokType::Int.convert("x1"), Value::from("x1"));
        assert_eq!(GrokType::Float.convert("1.5"), Value::Float(1.5));
    }

    #[test]
    fn test_compile_errors() {
        assert!(GrokPattern::compile("%{NOPE:x}").is_err());
        assert!(GrokPattern::compile("%{INT:x:decimal}").is_err());
    }

    #[test]
    fn test_loglevel_and_timestamp() {
        let g = GrokPattern::compile("%{TIMESTAMP_ISO8601:ts} %{LOGLEVEL:level} %{GREEDYDATA:msg}")
            .unwrap();
        let fields = g.captures("2024-03-12T10:01:02Z WARN disk almost full").unwrap();
        assert_eq!(fields[1], ("level".to_string(), Value::from("WARN")));
        assert_eq!(fields[2], ("msg".to_string(), Value::from("disk almost full")));
    }
}
