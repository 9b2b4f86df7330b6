//! Tokenizer for condition expressions.

use super::ExpressionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// A quoted string literal, unescaped.
    Quoted(String),
    /// Anything else that stands for a value: numbers, keywords,
    /// JSON arrays/objects, unresolved identifiers.
    Bare(String),
    LParen,
    RParen,
    Cmp(Comparator),
    And,
    Or,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Quoted(s) => format!("\"{s}\""),
            Token::Bare(s) => s.clone(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Cmp(Comparator::Eq) => "==".into(),
            Token::Cmp(Comparator::Ne) => "!=".into(),
            Token::Cmp(Comparator::Gt) => ">".into(),
            Token::Cmp(Comparator::Lt) => "<".into(),
            Token::Cmp(Comparator::Ge) => ">=".into(),
            Token::Cmp(Comparator::Le) => "<=".into(),
            Token::And => "&&".into(),
            Token::Or => "||".into(),
        }
    }
}

/// Characters that end a bare literal.
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '=' | '!' | '<' | '>' | '&' | '|' | '"' | '\'' | '[' | '{')
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators win over their one-character prefixes.
        let two = match (c, next) {
            ('=', Some('=')) => Some(Token::Cmp(Comparator::Eq)),
            ('!', Some('=')) => Some(Token::Cmp(Comparator::Ne)),
            ('>', Some('=')) => Some(Token::Cmp(Comparator::Ge)),
            ('<', Some('=')) => Some(Token::Cmp(Comparator::Le)),
            ('&', Some('&')) => Some(Token::And),
            ('|', Some('|')) => Some(Token::Or),
            _ => None,
        };
        if let Some(token) = two {
            tokens.push(token);
            i += 2;
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '>' => {
                tokens.push(Token::Cmp(Comparator::Gt));
                i += 1;
            }
            '<' => {
                tokens.push(Token::Cmp(Comparator::Lt));
                i += 1;
            }
            '"' | '\'' => {
                let (text, end) = read_quoted(&chars, i)?;
                tokens.push(Token::Quoted(text));
                i = end;
            }
            '[' | '{' => {
                let end = find_closing_bracket(&chars, i)?;
                tokens.push(Token::Bare(chars[i..end].iter().collect()));
                i = end;
            }
            '=' | '!' | '&' | '|' | ']' | '}' => {
                return Err(ExpressionError::UnexpectedToken(c.to_string()));
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Bare(chars[start..i].iter().collect()));
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted literal starting at `start`; returns the unescaped text and
/// the index just past the closing quote.
fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize), ExpressionError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let escaped = chars[i + 1];
                i += 2;
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    'b' => text.push('\u{8}'),
                    'f' => text.push('\u{c}'),
                    'u' => {
                        let hex: String = chars.iter().skip(i).take(4).collect();
                        let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                        match decoded {
                            Some(ch) if hex.len() == 4 => {
                                text.push(ch);
                                i += 4;
                            }
                            _ => text.push('u'),
                        }
                    }
                    other => text.push(other),
                }
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ExpressionError::UnterminatedString)
}

/// Index just past the bracket that closes the one at `start`, skipping
/// over string contents.
fn find_closing_bracket(chars: &[char], start: usize) -> Result<usize, ExpressionError> {
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = in_string {
            if c == '\\' {
                i += 1;
            } else if c == q {
                in_string = None;
            }
        } else {
            match c {
                '"' | '\'' => in_string = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i + 1);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    Err(ExpressionError::UnexpectedEnd)
}
