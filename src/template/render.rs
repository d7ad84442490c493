//! Section and placeholder resolution over the token stream.

use serde_json::{Map, Value};

use super::parser::{tokenize, Token};

/// Template parameters keyed by placeholder name
pub type Params = Map<String, Value>;

/// Render one template string against `params`.
///
/// `{{#if name}}` blocks pair with `{{/if}}` by depth, so they nest freely.
/// A section start pairs with the first later unconsumed end of the same
/// name. Truthy sections keep their content and lose the markers, falsy or
/// absent ones are dropped whole. Markers with no partner are emitted as
/// written. Placeholder values are inserted as-is and never rescanned.
pub fn render_str(template: &str, params: &Params) -> String {
    let tokens = tokenize(template);
    let if_pairs = pair_if_blocks(&tokens);
    let mut consumed = vec![false; tokens.len()];
    let mut out = String::with_capacity(template.len());

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            Token::Literal(text) => out.push_str(text),
            Token::Placeholder { name, .. } => {
                if let Some(value) = params.get(name) {
                    push_value(&mut out, value);
                }
            }
            Token::SectionStart { name, raw } => match find_end(&tokens, &consumed, i + 1, name) {
                Some(end) if is_truthy(params.get(name)) => consumed[end] = true,
                Some(end) => i = end,
                None => out.push_str(raw),
            },
            Token::SectionEnd { raw, .. } => {
                if !consumed[i] {
                    out.push_str(raw);
                }
            }
            Token::IfStart { name, raw } => match if_pairs[i] {
                Some(_) if is_truthy(params.get(name)) => {}
                Some(end) => i = end,
                None => out.push_str(raw),
            },
            Token::IfEnd { raw } => {
                if if_pairs[i].is_none() {
                    out.push_str(raw);
                }
            }
        }
        i += 1;
    }

    out
}

/// Match every `{{/if}}` with the nearest open `{{#if}}` before it.
fn pair_if_blocks(tokens: &[Token<'_>]) -> Vec<Option<usize>> {
    let mut pairs = vec![None; tokens.len()];
    let mut open = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::IfStart { .. } => open.push(i),
            Token::IfEnd { .. } => {
                if let Some(start) = open.pop() {
                    pairs[start] = Some(i);
                    pairs[i] = Some(start);
                }
            }
            _ => {}
        }
    }

    pairs
}

fn find_end(tokens: &[Token<'_>], consumed: &[bool], from: usize, name: &str) -> Option<usize> {
    (from..tokens.len()).find(|&j| {
        !consumed[j] && matches!(tokens[j], Token::SectionEnd { name: end, .. } if end == name)
    })
}

/// Truthiness used by conditional sections.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Null => {}
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        // Arrays and objects render as compact JSON
        other => out.push_str(&other.to_string()),
    }
}
