//! Tokenizer for the template marker syntax.
//!
//! Recognized markers:
//! - `{{name}}` and `{{{name}}}` placeholders
//! - `{{#name}}` section start
//! - `{{/name}}` section end
//! - `{{#if name}}` and `{{/if}}` conditional blocks, which may nest
//!
//! Anything that does not form a well-formed marker stays literal text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Literal(&'a str),
    Placeholder { name: &'a str, raw: &'a str },
    SectionStart { name: &'a str, raw: &'a str },
    SectionEnd { name: &'a str, raw: &'a str },
    IfStart { name: &'a str, raw: &'a str },
    IfEnd { raw: &'a str },
}

impl<'a> Token<'a> {
    /// The exact source text of this token
    pub fn raw(&self) -> &'a str {
        match *self {
            Token::Literal(text) => text,
            Token::Placeholder { raw, .. }
            | Token::SectionStart { raw, .. }
            | Token::SectionEnd { raw, .. }
            | Token::IfStart { raw, .. }
            | Token::IfEnd { raw } => raw,
        }
    }
}

enum MarkerKind {
    Placeholder,
    SectionStart,
    SectionEnd,
    IfStart,
    IfEnd,
}

/// Split a template into tokens in a single left-to-right pass.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(offset) = input[pos..].find("{{") {
        let start = pos + offset;

        match parse_marker(&input[start..]) {
            Some((kind, name, len)) => {
                if literal_start < start {
                    tokens.push(Token::Literal(&input[literal_start..start]));
                }
                let raw = &input[start..start + len];
                tokens.push(match kind {
                    MarkerKind::Placeholder => Token::Placeholder { name, raw },
                    MarkerKind::SectionStart => Token::SectionStart { name, raw },
                    MarkerKind::SectionEnd => Token::SectionEnd { name, raw },
                    MarkerKind::IfStart => Token::IfStart { name, raw },
                    MarkerKind::IfEnd => Token::IfEnd { raw },
                });
                pos = start + len;
                literal_start = pos;
            }
            // Not a marker here; retry from the next brace
            None => pos = start + 1,
        }
    }

    if literal_start < input.len() {
        tokens.push(Token::Literal(&input[literal_start..]));
    }

    tokens
}

/// Parse a marker at the start of `s`, returning its kind, name and byte length.
fn parse_marker(s: &str) -> Option<(MarkerKind, &str, usize)> {
    if let Some(rest) = s.strip_prefix("{{{") {
        if let Some(end) = rest.find("}}}") {
            let name = &rest[..end];
            if is_valid_name(name) {
                return Some((MarkerKind::Placeholder, name, end + 6));
            }
        }
    }

    let rest = s.strip_prefix("{{")?;
    let end = rest.find("}}")?;
    let inner = &rest[..end];
    let len = end + 4;

    if inner == "/if" {
        return Some((MarkerKind::IfEnd, "if", len));
    }

    let (kind, name) = if let Some(name) = inner.strip_prefix("#if ") {
        (MarkerKind::IfStart, name.trim())
    } else if let Some(name) = inner.strip_prefix('#') {
        (MarkerKind::SectionStart, name)
    } else if let Some(name) = inner.strip_prefix('/') {
        (MarkerKind::SectionEnd, name)
    } else {
        (MarkerKind::Placeholder, inner)
    };

    is_valid_name(name).then_some((kind, name, len))
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
