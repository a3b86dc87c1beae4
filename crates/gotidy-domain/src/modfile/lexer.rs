use super::ModParseError;

/// Tokens and trailing comment of a single go.mod source line.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct LexedLine {
    pub(super) tokens: Vec<String>,
    pub(super) comment: Option<String>,
}

const PUNCTUATION: [char; 5] = ['(', ')', '[', ']', ','];

pub(super) fn is_punctuation(token: &str) -> bool {
    token.len() == 1 && token.chars().all(|ch| PUNCTUATION.contains(&ch))
}

pub(super) fn lex_line(raw: &str, line: usize) -> Result<LexedLine, ModParseError> {
    let mut lexed = LexedLine::default();
    let chars: Vec<char> = raw.chars().collect();
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        if ch.is_whitespace() {
            idx += 1;
            continue;
        }
        if ch == '/' && chars.get(idx + 1) == Some(&'/') {
            let comment: String = chars[idx..].iter().collect();
            lexed.comment = Some(comment.trim_end().to_string());
            break;
        }
        if PUNCTUATION.contains(&ch) {
            lexed.tokens.push(ch.to_string());
            idx += 1;
            continue;
        }
        if ch == '"' || ch == '`' {
            let end = closing_quote(&chars, idx, ch)
                .ok_or_else(|| ModParseError::at(line, "unterminated quoted string"))?;
            lexed.tokens.push(chars[idx..=end].iter().collect());
            idx = end + 1;
            continue;
        }

        let start = idx;
        while idx < chars.len() {
            let ch = chars[idx];
            if ch.is_whitespace() || PUNCTUATION.contains(&ch) || ch == '"' || ch == '`' {
                break;
            }
            idx += 1;
        }
        lexed.tokens.push(chars[start..idx].iter().collect());
    }

    Ok(lexed)
}

fn closing_quote(chars: &[char], open: usize, quote: char) -> Option<usize> {
    let mut idx = open + 1;
    while idx < chars.len() {
        match chars[idx] {
            '\\' if quote == '"' => idx += 2,
            ch if ch == quote => return Some(idx),
            _ => idx += 1,
        }
    }
    None
}

/// Strip go.mod quoting from a token; bare tokens are returned as-is.
pub fn unquote(token: &str) -> String {
    if token.len() >= 2 && token.starts_with('`') && token.ends_with('`') {
        return token[1..token.len() - 1].to_string();
    }
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        let inner = &token[1..token.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => {}
                }
            } else {
                out.push(ch);
            }
        }
        return out;
    }
    token.to_string()
}

/// Quote a module path only when it cannot be written as a bare token.
pub fn auto_quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains("//")
        || value
            .chars()
            .any(|ch| ch.is_whitespace() || PUNCTUATION.contains(&ch) || ch == '"' || ch == '`');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
