//! Lexer for the emitted source subset.
//!
//! Built on logos. Integer literals are lexed as magnitudes; the parser
//! applies a leading minus so that `-2147483648` stays representable.

use crate::{CompileError, CompileResult};
use logos::Logos;
use std::fmt;

/// Source location of a token (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[token("/*", lex_block_comment)]
    BlockComment,

    // Keywords
    #[token("package")]
    Package,
    #[token("import")]
    Import,
    #[token("class")]
    Class,
    #[token("extends")]
    Extends,
    #[token("public")]
    Public,
    #[token("protected")]
    Protected,
    #[token("private")]
    Private,
    #[token("static")]
    Static,
    #[token("final")]
    Final,
    #[token("abstract")]
    Abstract,
    #[token("void")]
    Void,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("return")]
    Return,
    #[token("throw")]
    Throw,
    #[token("new")]
    New,
    #[token("this")]
    This,
    #[token("super")]
    Super,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[token("boolean", primitive)]
    #[token("byte", primitive)]
    #[token("char", primitive)]
    #[token("short", primitive)]
    #[token("int", primitive)]
    #[token("long", primitive)]
    #[token("float", primitive)]
    #[token("double", primitive)]
    Primitive(String),

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(u64),

    #[regex(r"[0-9]+[lL]", parse_long)]
    Long(u64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", parse_double)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", parse_double)]
    Double(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    Str(String),

    // Operators
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("!")]
    Bang,
    #[token("=")]
    Equal,

    // Punctuation
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Primitive(name) | Token::Ident(name) => write!(f, "`{}`", name),
            Token::Int(value) | Token::Long(value) => write!(f, "number {}", value),
            Token::Double(value) => write!(f, "number {:?}", value),
            Token::Str(_) => f.write_str("string literal"),
            Token::Eof => f.write_str("end of input"),
            other => write!(f, "`{}`", other.symbol()),
        }
    }
}

impl Token {
    fn symbol(&self) -> &'static str {
        match self {
            Token::Package => "package",
            Token::Import => "import",
            Token::Class => "class",
            Token::Extends => "extends",
            Token::Public => "public",
            Token::Protected => "protected",
            Token::Private => "private",
            Token::Static => "static",
            Token::Final => "final",
            Token::Abstract => "abstract",
            Token::Void => "void",
            Token::If => "if",
            Token::Else => "else",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Return => "return",
            Token::Throw => "throw",
            Token::New => "new",
            Token::This => "this",
            Token::Super => "super",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::AmpAmp => "&&",
            Token::PipePipe => "||",
            Token::EqualEqual => "==",
            Token::BangEqual => "!=",
            Token::LessEqual => "<=",
            Token::GreaterEqual => ">=",
            Token::Less => "<",
            Token::Greater => ">",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Bang => "!",
            Token::Equal => "=",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            _ => "?",
        }
    }
}

fn lex_block_comment(lex: &mut logos::Lexer<'_, Token>) -> logos::Skip {
    let remainder = lex.remainder();
    match remainder.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(remainder.len()),
    }
    logos::Skip
}

fn primitive(lex: &mut logos::Lexer<'_, Token>) -> String {
    lex.slice().to_string()
}

fn parse_long(lex: &mut logos::Lexer<'_, Token>) -> Option<u64> {
    let s = lex.slice();
    s[..s.len() - 1].parse().ok()
}

fn parse_double(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let s = lex.slice();
    unescape(&s[1..s.len() - 1])
}

/// Undo the source emitter's escaping; `None` on an unknown escape
pub fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Tokenize `source`; the result always ends with [`Token::Eof`]
pub fn tokenize(source: &str) -> CompileResult<Vec<(Token, Span)>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1u32;
    let mut column = 1u32;
    let mut last_end = 0;

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        for c in source[last_end..range.start].chars() {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        let span = Span {
            start: range.start,
            end: range.end,
            line,
            column,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(CompileError::Lex {
                    line,
                    column,
                    text: lexer.slice().to_string(),
                })
            }
        }
        last_end = range.start;
    }

    for c in source[last_end..].chars() {
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    let end = source.len();
    tokens.push((
        Token::Eof,
        Span {
            start: end,
            end,
            line,
            column,
        },
    ));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("public int integer"),
            vec![
                Token::Public,
                Token::Primitive("int".to_string()),
                Token::Ident("integer".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("2147483648 7L 1.5 1e-7"),
            vec![
                Token::Int(2_147_483_648),
                Token::Long(7),
                Token::Double(1.5),
                Token::Double(1e-7),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c\n\u0001""#),
            vec![Token::Str("a\"b\\c\n\u{1}".to_string()), Token::Eof]
        );
        assert!(matches!(
            tokenize(r#""bad \q""#),
            Err(CompileError::Lex { .. })
        ));
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens = tokenize("// header\n/* block */ class\n  Flow").unwrap();
        assert_eq!(tokens[0].0, Token::Class);
        assert_eq!(tokens[0].1.line, 2);
        assert_eq!(tokens[1].1.line, 3);
        assert_eq!(tokens[1].1.column, 3);
    }

    #[test]
    fn test_unexpected_character() {
        match tokenize("int x = 1 % 2;") {
            Err(CompileError::Lex { line, text, .. }) => {
                assert_eq!(line, 1);
                assert_eq!(text, "%");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
