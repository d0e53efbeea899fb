//! Minimal SQL tokenizer for tag extraction

use std::fmt;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unquoted identifier or keyword, as written
    Word(String),
    /// Quoted identifier with the quotes removed
    QuotedIdent(String),
    /// String literal with quotes removed and `''` unescaped
    Str(String),
    /// Numeric literal, as written
    Number(String),
    /// Positional `?` placeholder with its zero-based ordinal
    Placeholder(usize),
    /// Operator or punctuation
    Symbol(String),
}

impl Token {
    /// Case-insensitive keyword match for unquoted words
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self, Token::Symbol(s) if s == symbol)
    }
}

/// Tokenizer failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    UnterminatedString(usize),
    UnterminatedIdentifier(usize),
    UnterminatedComment(usize),
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedString(at) => write!(f, "unterminated string literal at byte {}", at),
            Self::UnterminatedIdentifier(at) => {
                write!(f, "unterminated quoted identifier at byte {}", at)
            }
            Self::UnterminatedComment(at) => write!(f, "unterminated block comment at byte {}", at),
        }
    }
}

const TWO_CHAR_SYMBOLS: &[&str] = &["<=", ">=", "<>", "!=", "||", "::"];

/// Split SQL text into tokens
pub fn tokenize(sql: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut tokens = Vec::new();
    let mut placeholder = 0;
    let mut i = 0;

    while i < chars.len() {
        let (at, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
        } else if c == '/' && next == Some('*') {
            i += 2;
            loop {
                if i + 1 >= chars.len() {
                    return Err(LexError::UnterminatedComment(at));
                }
                if chars[i].1 == '*' && chars[i + 1].1 == '/' {
                    i += 2;
                    break;
                }
                i += 1;
            }
        } else if c == '\'' {
            let (text, end) = read_quoted(&chars, i, '\'').ok_or(LexError::UnterminatedString(at))?;
            tokens.push(Token::Str(text));
            i = end;
        } else if c == '"' || c == '`' || c == '[' {
            let close = if c == '[' { ']' } else { c };
            let (text, end) =
                read_quoted(&chars, i, close).ok_or(LexError::UnterminatedIdentifier(at))?;
            tokens.push(Token::QuotedIdent(text));
            i = end;
        } else if c == '?' {
            tokens.push(Token::Placeholder(placeholder));
            placeholder += 1;
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            i += 1;
            while i < chars.len() {
                let ch = chars[i].1;
                let prev = chars[i - 1].1;
                let exponent_sign = (ch == '+' || ch == '-') && (prev == 'e' || prev == 'E');
                if ch.is_ascii_alphanumeric() || ch == '.' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(collect(&chars[start..i])));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '$') {
                i += 1;
            }
            tokens.push(Token::Word(collect(&chars[start..i])));
        } else {
            let pair: String = [Some(c), next].iter().flatten().collect();
            if TWO_CHAR_SYMBOLS.contains(&pair.as_str()) {
                tokens.push(Token::Symbol(pair));
                i += 2;
            } else {
                tokens.push(Token::Symbol(c.to_string()));
                i += 1;
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted run starting at `start`; a doubled closing quote is an escape.
fn read_quoted(chars: &[(usize, char)], start: usize, close: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c == close {
            if chars.get(i + 1).map(|(_, c)| *c) == Some(close) {
                text.push(close);
                i += 2;
                continue;
            }
            return Some((text, i + 1));
        }
        text.push(c);
        i += 1;
    }
    None
}

fn collect(chars: &[(usize, char)]) -> String {
    chars.iter().map(|(_, c)| *c).collect()
}
