use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::IndexError;

/// Built-in sensitive patterns, applied in order. More specific digit shapes
/// (card, national id) come before the generic phone shape so one pass never
/// splits a longer match.
static BUILTIN: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "[EMAIL]",
        ),
        (r"\b\d{4}[- ]\d{4}[- ]\d{4}[- ]\d{4}\b", "[CARD]"),
        (r"\b\d{6}-\d{7}\b", "[ID]"),
        (r"\b\+?\d{2,3}[-.\s]\d{3,4}[-.\s]\d{4}\b", "[PHONE]"),
        (r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b", "[IP]"),
    ]
    .into_iter()
    .map(|(pattern, label)| {
        (
            Regex::new(pattern).expect("builtin redaction regex is valid"),
            label,
        )
    })
    .collect()
});

/// Masks sensitive spans in place with bracketed class tags, keeping the
/// surrounding text readable. Placeholders contain no digits or `@`, so
/// applying the filter twice yields the same output.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    custom: Vec<Regex>,
}

impl Redactor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the built-in patterns with operator-supplied regexes, masked
    /// as `[REDACTED]`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::RedactionPattern` for any pattern that does not
    /// compile; configuration errors are fatal at startup rather than
    /// silently dropped.
    pub fn with_patterns(patterns: &[String]) -> Result<Self, IndexError> {
        let mut custom = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let regex = Regex::new(pattern).map_err(|e| IndexError::RedactionPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            custom.push(regex);
        }
        Ok(Self { custom })
    }

    /// Mask all sensitive spans. Returns `Cow::Borrowed` when nothing matched.
    #[must_use]
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(text);
        for (regex, label) in BUILTIN.iter() {
            if regex.is_match(&current) {
                current = Cow::Owned(regex.replace_all(&current, *label).into_owned());
            }
        }
        for regex in &self.custom {
            if regex.is_match(&current) {
                current = Cow::Owned(regex.replace_all(&current, "[REDACTED]").into_owned());
            }
        }
        current
    }
}
