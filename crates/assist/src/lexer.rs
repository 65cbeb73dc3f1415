//! Single-pass Lua lexer.
//!
//! Returns `Vec<(Range<usize>, LuaTokenType)>` with byte offsets aligned to
//! UTF-8 char boundaries. Whitespace is not emitted. Used to tell code
//! positions from positions inside strings and comments.

use std::ops::Range;

/// Lua 5.4 reserved words.
pub const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaTokenType {
    Keyword,
    Name,
    String,
    Number,
    Comment,
    Symbol,
}

pub fn tokenize_lua(input: &str) -> Vec<(Range<usize>, LuaTokenType)> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if !b.is_ascii() {
            // Stray non-ASCII outside a string: skip the whole char
            i += input[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            continue;
        }

        let start = i;
        let kind = if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            i = match long_bracket_level(bytes, i + 2) {
                Some(level) => long_bracket_end(bytes, i + 2 + level + 2, level),
                None => line_end(bytes, i),
            };
            LuaTokenType::Comment
        } else if b == b'"' || b == b'\'' {
            i = quoted_end(bytes, i);
            LuaTokenType::String
        } else if let Some(level) = long_bracket_level(bytes, i) {
            i = long_bracket_end(bytes, i + level + 2, level);
            LuaTokenType::String
        } else if b.is_ascii_digit() || (b == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            i = number_end(bytes, i);
            LuaTokenType::Number
        } else if is_name_start(b) {
            while i < bytes.len() && is_name_byte(bytes[i]) {
                i += 1;
            }
            if LUA_KEYWORDS.contains(&&input[start..i]) {
                LuaTokenType::Keyword
            } else {
                LuaTokenType::Name
            }
        } else {
            i += symbol_len(&bytes[i..]);
            LuaTokenType::Symbol
        };
        tokens.push((start..i, kind));
    }

    tokens
}

/// True when `offset` is in code, not inside a string literal or comment.
pub fn is_code_position(input: &str, offset: usize) -> bool {
    let offset = offset.min(input.len());
    for (range, kind) in tokenize_lua(input) {
        if range.start >= offset {
            break;
        }
        let text = &input[range.clone()];
        let inside = match kind {
            LuaTokenType::String => offset < range.end || (offset == range.end && !string_closed(text)),
            LuaTokenType::Comment => offset < range.end || (offset == range.end && !comment_closed(text)),
            _ => false,
        };
        if inside {
            return false;
        }
    }
    true
}

pub fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

pub fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..].iter().position(|&b| b == b'\n').map(|p| from + p).unwrap_or(bytes.len())
}

/// End of a quoted string starting at `start`. Unterminated strings run to
/// the end of the line.
fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// `[`, N `=`, `[` at `pos` gives `Some(N)`.
fn long_bracket_level(bytes: &[u8], pos: usize) -> Option<usize> {
    if bytes.get(pos) != Some(&b'[') {
        return None;
    }
    let level = bytes[pos + 1..].iter().take_while(|&&b| b == b'=').count();
    (bytes.get(pos + 1 + level) == Some(&b'[')).then_some(level)
}

/// Byte after the matching `]=*]`, or the end of input when unterminated.
fn long_bracket_end(bytes: &[u8], from: usize, level: usize) -> usize {
    let mut i = from.min(bytes.len());
    while i < bytes.len() {
        if bytes[i] == b']' {
            let eq = bytes[i + 1..].iter().take_while(|&&b| b == b'=').count();
            if eq == level && bytes.get(i + 1 + eq) == Some(&b']') {
                return i + eq + 2;
            }
        }
        i += 1;
    }
    bytes.len()
}

fn number_end(bytes: &[u8], start: usize) -> usize {
    let hex = bytes[start] == b'0' && matches!(bytes.get(start + 1), Some(b'x' | b'X'));
    let mut i = if hex { start + 2 } else { start };
    let exponent: &[u8] = if hex { b"pP" } else { b"eE" };
    while i < bytes.len() {
        let c = bytes[i];
        if exponent.contains(&c) {
            i += 1;
            if matches!(bytes.get(i), Some(b'+' | b'-')) {
                i += 1;
            }
        } else if (hex && c.is_ascii_hexdigit()) || c.is_ascii_digit() {
            i += 1;
        } else if c == b'.' && bytes.get(i + 1) != Some(&b'.') {
            i += 1;
        } else {
            break;
        }
    }
    i
}

fn symbol_len(rest: &[u8]) -> usize {
    const LONG: &[&[u8]] = &[b"...", b"..", b"==", b"~=", b"<=", b">=", b"//", b"::", b"<<", b">>"];
    LONG.iter().find(|op| rest.starts_with(op)).map(|op| op.len()).unwrap_or(1)
}

fn string_closed(text: &str) -> bool {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(&q @ (b'"' | b'\'')) => bytes.len() >= 2 && bytes[bytes.len() - 1] == q && bytes[bytes.len() - 2] != b'\\',
        _ => text.ends_with(']'),
    }
}

fn comment_closed(text: &str) -> bool {
    long_bracket_level(text.as_bytes(), 2).is_some() && text.ends_with(']')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(input: &str) -> Vec<(&str, LuaTokenType)> {
        tokenize_lua(input).into_iter().map(|(r, t)| (&input[r], t)).collect()
    }

    #[test]
    fn test_keywords_and_names() {
        assert_eq!(
            tok("local x = nil"),
            vec![
                ("local", LuaTokenType::Keyword),
                ("x", LuaTokenType::Name),
                ("=", LuaTokenType::Symbol),
                ("nil", LuaTokenType::Keyword),
            ]
        );
    }

    #[test]
    fn test_keyword_count() {
        assert_eq!(LUA_KEYWORDS.len(), 22);
    }

    #[test]
    fn test_member_access() {
        assert_eq!(
            tok("host.log"),
            vec![("host", LuaTokenType::Name), (".", LuaTokenType::Symbol), ("log", LuaTokenType::Name)]
        );
    }

    #[test]
    fn test_numbers_and_concat() {
        assert_eq!(
            tok("1..2 0x1F 3.5e-2"),
            vec![
                ("1", LuaTokenType::Number),
                ("..", LuaTokenType::Symbol),
                ("2", LuaTokenType::Number),
                ("0x1F", LuaTokenType::Number),
                ("3.5e-2", LuaTokenType::Number),
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(tok(r#""a\"b" 'c'"#), vec![(r#""a\"b""#, LuaTokenType::String), ("'c'", LuaTokenType::String)]);
        assert_eq!(tok("[==[x]]y]==]"), vec![("[==[x]]y]==]", LuaTokenType::String)]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(tok("-- note\nx"), vec![("-- note", LuaTokenType::Comment), ("x", LuaTokenType::Name)]);
        assert_eq!(tok("--[[ a\nb ]] y"), vec![("--[[ a\nb ]]", LuaTokenType::Comment), ("y", LuaTokenType::Name)]);
    }

    #[test]
    fn test_indexing_is_not_long_bracket() {
        assert_eq!(
            tok("t[1]"),
            vec![
                ("t", LuaTokenType::Name),
                ("[", LuaTokenType::Symbol),
                ("1", LuaTokenType::Number),
                ("]", LuaTokenType::Symbol),
            ]
        );
    }

    #[test]
    fn test_unicode_in_string_and_comment() {
        let input = "s = 'héllo' -- ünïcode";
        let tokens = tokenize_lua(input);
        for (range, _) in &tokens {
            assert!(input.is_char_boundary(range.start));
            assert!(input.is_char_boundary(range.end));
        }
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_code_position() {
        let src = "print('host.') -- host.";
        assert!(is_code_position(src, 5));
        assert!(!is_code_position(src, 12));
        assert!(is_code_position(src, 14));
        assert!(!is_code_position(src, src.len()));

        let open = "x = 'host.";
        assert!(!is_code_position(open, open.len()));

        let block = "--[[ c ]]";
        assert!(is_code_position(block, block.len()));
    }
}
