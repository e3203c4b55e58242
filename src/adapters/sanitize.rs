//! Log sanitization for secret and identity filtering.
//!
//! Applied to every formatted log line through `SanitizingMakeWriter`:
//! - `passphrase=...`-style secrets
//! - Long base64 blobs (ciphertext, nonces, tags, whole wire packages)
//! - Hex key material
//! - Email addresses and UUIDs
//!
//! The first line of defense is that pipeline code never passes key bytes,
//! package fields or patient names to a logging call. This is the fallback.
//!
//! Input is capped (see `VITALGUARD_SANITIZE_MAX_BYTES`) so a huge log line
//! cannot stall the writer.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

/// Defaults to 16 KiB; override via `VITALGUARD_SANITIZE_MAX_BYTES`.
const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

struct Rule {
    regex: Regex,
    replacement: &'static str,
    applies: fn(&str) -> bool,
}

struct Patterns {
    set: RegexSet,
    rules: Vec<Rule>,
}

// Applied in order; contextual secrets go first so the value is removed
// whole before the generic blob rules see it.
const RULES: &[(&str, &str, fn(&str) -> bool)] = &[
    (
        r#"(?i)\b(?:passphrase|password|passwd|pwd|secret|api[_-]?key|token)\b\s*[:=]\s*"?[^\s",}]+"?"#,
        "[REDACTED-SECRET]",
        always,
    ),
    (
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        "[REDACTED-UUID]",
        always,
    ),
    (
        r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
        always,
    ),
    (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-KEY]", always),
    (r"[A-Za-z0-9+/]{24,}={0,2}", "[REDACTED-BLOB]", looks_like_base64),
];

fn always(_: &str) -> bool {
    true
}

/// Padded base64 always has a length divisible by 4. Lowercase
/// slash-separated runs without `+` are file paths.
fn looks_like_base64(candidate: &str) -> bool {
    if candidate.len() % 4 != 0 {
        return false;
    }
    let path_like = candidate.contains('/')
        && !candidate
            .bytes()
            .any(|b| b.is_ascii_uppercase() || b == b'+');
    !path_like
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }

    let mut end = max_bytes.min(input.len());
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

fn max_sanitize_bytes() -> usize {
    std::env::var("VITALGUARD_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| {
        let set = RegexSet::new(RULES.iter().map(|(p, _, _)| *p)).expect("Valid regex set");
        let rules = RULES
            .iter()
            .map(|&(pattern, replacement, applies)| Rule {
                regex: Regex::new(pattern).expect("Valid regex"),
                replacement,
                applies,
            })
            .collect();
        Patterns { set, rules }
    })
}

/// Replace secrets and identifiers in `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let patterns = patterns();
    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    let mut result = prefix.to_string();
    for idx in patterns.set.matches(prefix).into_iter() {
        let rule = &patterns.rules[idx];
        result = rule
            .regex
            .replace_all(&result, |caps: &regex::Captures<'_>| {
                let found = &caps[0];
                if (rule.applies)(found) {
                    rule.replacement.to_string()
                } else {
                    found.to_string()
                }
            })
            .into_owned();
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
    }
    result
}

/// Check whether a string contains anything `sanitize` would redact.
#[must_use]
pub fn contains_secret(input: &str) -> bool {
    let (prefix, _truncated) = truncate_to_char_boundary(input, max_sanitize_bytes());
    patterns().set.is_match(prefix) && sanitize_with_limit(prefix, usize::MAX) != prefix
}

/// A `tracing_subscriber` writer wrapper that sanitizes each formatted line
/// before it reaches the underlying sink.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

pub struct SanitizingWriter<W: std::io::Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: std::io::Write> SanitizingWriter<W> {
    fn flush_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let sanitized = sanitize(&String::from_utf8_lossy(&line));
            self.inner.write_all(sanitized.as_bytes())?;
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // Bound buffering when a formatter writes a huge line with no newline.
        let hard_cap = max_sanitize_bytes().saturating_mul(2);
        if self.buffer.len() > hard_cap {
            let sanitized = sanitize(&String::from_utf8_lossy(&self.buffer));
            self.inner.write_all(sanitized.as_bytes())?;
            self.inner.write_all(b"\n")?;
            self.buffer.clear();
            return Ok(buf.len());
        }

        self.flush_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_lines()?;
        if !self.buffer.is_empty() {
            let sanitized = sanitize(&String::from_utf8_lossy(&self.buffer));
            self.inner.write_all(sanitized.as_bytes())?;
            self.buffer.clear();
        }
        self.inner.flush()
    }
}

impl<W: std::io::Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        let _ = std::io::Write::flush(self);
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            buffer: Vec::new(),
        }
    }
}
