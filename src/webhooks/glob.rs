//! Branch filter globs.
//!
//! Supported syntax:
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `*` | any run of characters, including `/` |
//! | `?` | any single character |
//! | `[abc]`, `[a-z]` | one character from the class |
//! | `[!abc]` | one character not in the class |
//! | `{main,release/*}` | any of the comma-separated alternatives (may nest) |
//! | `\x` | the literal character `x` |
//!
//! Patterns are compiled to an anchored [`Regex`].

use crate::{Error, Result};
use regex::Regex;

/// A compiled branch filter.
#[derive(Debug, Clone)]
pub struct BranchGlob {
    pattern: String,
    regex: Regex,
}

impl BranchGlob {
    /// Compiles a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBranchFilter`] for unclosed classes or
    /// alternations, a dangling escape, or an invalid character range.
    pub fn compile(pattern: &str) -> Result<Self> {
        let invalid = |cause: String| Error::InvalidBranchFilter {
            pattern: pattern.to_string(),
            cause,
        };
        let source = translate(pattern).map_err(|cause| invalid(cause.to_string()))?;
        let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Returns `true` if `branch` matches the whole pattern.
    #[must_use]
    pub fn is_match(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }

    /// The source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Returns `true` for filters that match every branch without compiling.
#[must_use]
pub fn matches_everything(filter: &str) -> bool {
    let filter = filter.trim();
    filter.is_empty() || filter == "*"
}

fn translate(pattern: &str) -> std::result::Result<String, &'static str> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut depth = 0usize;
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                while chars.next_if_eq(&'*').is_some() {}
                out.push_str(".*");
            },
            '?' => out.push('.'),
            '[' => translate_class(&mut chars, &mut out)?,
            '{' => {
                depth += 1;
                out.push_str("(?:");
            },
            ',' if depth > 0 => out.push('|'),
            '}' if depth > 0 => {
                depth -= 1;
                out.push(')');
            },
            '\\' => {
                let escaped = chars.next().ok_or("dangling escape at end of pattern")?;
                push_literal(&mut out, escaped);
            },
            other => push_literal(&mut out, other),
        }
    }

    if depth > 0 {
        return Err("unclosed '{' alternation");
    }
    out.push('$');
    Ok(out)
}

fn translate_class(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    out: &mut String,
) -> std::result::Result<(), &'static str> {
    out.push('[');
    if chars.next_if(|c| *c == '!' || *c == '^').is_some() {
        out.push('^');
    }

    let mut empty = true;
    loop {
        match chars.next() {
            None => return Err("unclosed '[' character class"),
            Some(']') if empty => return Err("empty character class"),
            Some(']') => break,
            Some('-') if !empty && chars.peek().is_some_and(|c| *c != ']') => out.push('-'),
            Some('\\') => {
                let escaped = chars.next().ok_or("dangling escape in character class")?;
                push_class_literal(out, escaped);
            },
            Some(c) => push_class_literal(out, c),
        }
        empty = false;
    }
    out.push(']');
    Ok(())
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

fn push_class_literal(out: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '-' | '&' | '~') {
        out.push('\\');
    }
    out.push(c);
}
