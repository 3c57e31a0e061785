//! Listing lexer
//!
//! Line breaks are significant, everything else except comments is a token. Words such as
//! `if`, `goto`, or `invoke` are plain identifiers; the parser tells them apart.

use super::ListingParseError;
use logos::Logos;
use std::ops::Range;

/// Listing token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    #[token("\n")]
    Eol,

    #[regex(r"[A-Za-z_][A-Za-z0-9_.$]*", |lex| lex.slice().to_string())]
    #[regex(r"`[^`\n]*`", |lex| strip_quotes(lex.slice()))]
    Identifier(String),

    #[regex(r"%[A-Za-z0-9_$]+", |lex| lex.slice()[1..].to_string())]
    Variable(String),

    #[regex(r"\$[A-Za-z0-9_$]+", |lex| lex.slice()[1..].to_string())]
    Label(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i32>().ok())]
    Integer(i32),

    #[regex(r"-?[0-9]+L", |lex| without_suffix(lex.slice()).parse::<i64>().ok())]
    Long(i64),

    #[regex(r"-?[0-9]+\.[0-9]+([eE][-+]?[0-9]+)?F", |lex| without_suffix(lex.slice()).parse::<f32>().ok())]
    #[regex(r"-?[0-9]+[eE][-+]?[0-9]+F", |lex| without_suffix(lex.slice()).parse::<f32>().ok())]
    Float(f32),

    #[regex(r"-?[0-9]+\.[0-9]+([eE][-+]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"-?[0-9]+[eE][-+]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Double(f64),

    #[regex(r"'([^'\\\n]|\\[^\n])*'", |lex| unescape(lex.slice()))]
    String(String),

    #[token(":=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Ampersand,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<<")]
    ShiftLeft,
    #[token(">>")]
    ShiftRight,
    #[token(">>>")]
    ShiftRightUnsigned,
    #[token("==")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("===")]
    ReferenceEqual,
    #[token("!==")]
    ReferenceNotEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessOrEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterOrEqual,
    #[token(",")]
    Comma,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
}

impl Token {
    /// Human-readable form for error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Eol => "end of line".to_string(),
            Token::Identifier(name) => format!("identifier '{}'", name),
            Token::Variable(name) => format!("variable %{}", name),
            Token::Label(name) => format!("label ${}", name),
            Token::Integer(v) => format!("integer {}", v),
            Token::Long(v) => format!("long {}L", v),
            Token::Float(v) => format!("float {}F", v),
            Token::Double(v) => format!("double {}", v),
            Token::String(_) => "string literal".to_string(),
            other => format!("'{}'", other.symbol().unwrap_or("?")),
        }
    }

    /// Source text of operator tokens
    pub fn symbol(&self) -> Option<&'static str> {
        let s = match self {
            Token::Assign => ":=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Ampersand => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::ShiftLeft => "<<",
            Token::ShiftRight => ">>",
            Token::ShiftRightUnsigned => ">>>",
            Token::Equal => "==",
            Token::NotEqual => "!=",
            Token::ReferenceEqual => "===",
            Token::ReferenceNotEqual => "!==",
            Token::Less => "<",
            Token::LessOrEqual => "<=",
            Token::Greater => ">",
            Token::GreaterOrEqual => ">=",
            Token::Comma => ",",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            _ => return None,
        };
        Some(s)
    }
}

fn strip_quotes(s: &str) -> String {
    s[1..s.len() - 1].to_string()
}

fn without_suffix(s: &str) -> &str {
    &s[..s.len() - 1]
}

fn unescape(s: &str) -> Option<String> {
    let inner = &s[1..s.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            'r' => result.push('\r'),
            't' => result.push('\t'),
            '\'' => result.push('\''),
            '\\' => result.push('\\'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                result.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(result)
}

/// Escape a string for a listing literal, without the surrounding quotes
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Split `source` into tokens with byte spans
pub fn tokenize(source: &str) -> Result<Vec<(Token, Range<usize>)>, ListingParseError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(ListingParseError::new(
                    format!("Unexpected input '{}'", &source[span.clone()]),
                    span.start,
                ))
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("lexes")
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn test_assignment_line() {
        assert_eq!(
            kinds("%c := %a + %b as int\n"),
            vec![
                Token::Variable("c".into()),
                Token::Assign,
                Token::Variable("a".into()),
                Token::Plus,
                Token::Variable("b".into()),
                Token::Identifier("as".into()),
                Token::Identifier("int".into()),
                Token::Eol,
            ]
        );
    }

    #[test]
    fn test_modulo_is_not_a_variable() {
        assert_eq!(
            kinds("%a % %b"),
            vec![Token::Variable("a".into()), Token::Percent, Token::Variable("b".into())]
        );
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(
            kinds("-5 12L 1.5F 2.25 1e20 -3.0e-2F"),
            vec![
                Token::Integer(-5),
                Token::Long(12),
                Token::Float(1.5),
                Token::Double(2.25),
                Token::Double(1e20),
                Token::Float(-3.0e-2),
            ]
        );
    }

    #[test]
    fn test_negate_spacing() {
        assert_eq!(kinds("- %x"), vec![Token::Minus, Token::Variable("x".into())]);
    }

    #[test]
    fn test_escaped_identifier_and_string() {
        assert_eq!(
            kinds("`Foo.bar(I)V` 'it\\'s\\n\\u0041'"),
            vec![Token::Identifier("Foo.bar(I)V".into()), Token::String("it's\nA".into())]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds("== != === !== < <= > >= >> >>> <<"),
            vec![
                Token::Equal,
                Token::NotEqual,
                Token::ReferenceEqual,
                Token::ReferenceNotEqual,
                Token::Less,
                Token::LessOrEqual,
                Token::Greater,
                Token::GreaterOrEqual,
                Token::ShiftRight,
                Token::ShiftRightUnsigned,
                Token::ShiftLeft,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(kinds("nop // trailing\n"), vec![Token::Identifier("nop".into()), Token::Eol]);
    }

    #[test]
    fn test_error_offset() {
        let err = tokenize("nop\n  #").expect_err("invalid character");
        assert_eq!(err.offset, 6);
    }

    #[test]
    fn test_escape_roundtrip() {
        let original = "a'b\\c\n\u{1}";
        let literal = format!("'{}'", escape(original));
        assert_eq!(kinds(&literal), vec![Token::String(original.to_string())]);
    }
}
