//! Tokenizer for condition text, built from nom combinators

use crate::condition::CompileError;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit1, satisfy};
use nom::combinator::{map, map_res, recognize, value};
use nom::sequence::{delimited, pair};
use nom::{IResult, Parser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Int(i64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    Dot,
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            TokenKind::Int(n) => return write!(f, "{}", n),
            TokenKind::Str(s) => return write!(f, "'{}'", s),
            TokenKind::Ident(name) => return f.write_str(name),
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::Not => "!",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Eof => "end of input",
        };
        f.write_str(symbol)
    }
}

/// A token and its byte offset in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

fn string_literal(input: &str) -> IResult<&str, TokenKind> {
    map(
        alt((
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        )),
        |s: &str| TokenKind::Str(s.to_string()),
    )
    .parse(input)
}

fn integer(input: &str) -> IResult<&str, TokenKind> {
    map_res(digit1, |digits: &str| digits.parse::<i64>().map(TokenKind::Int)).parse(input)
}

fn word(input: &str) -> IResult<&str, TokenKind> {
    map(
        recognize(pair(
            satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        |word: &str| match word {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            _ => TokenKind::Ident(word.to_string()),
        },
    )
    .parse(input)
}

fn operator(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::And, tag("&&")),
        value(TokenKind::Or, tag("||")),
        value(TokenKind::Eq, tag("==")),
        value(TokenKind::Ne, tag("!=")),
        value(TokenKind::Le, tag("<=")),
        value(TokenKind::Ge, tag(">=")),
        value(TokenKind::Not, char('!')),
        value(TokenKind::Lt, char('<')),
        value(TokenKind::Gt, char('>')),
        value(TokenKind::Plus, char('+')),
        value(TokenKind::Minus, char('-')),
        value(TokenKind::Star, char('*')),
        value(TokenKind::Slash, char('/')),
        value(TokenKind::Percent, char('%')),
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Comma, char(',')),
        value(TokenKind::Dot, char('.')),
    ))
    .parse(input)
}

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((string_literal, integer, word, operator)).parse(input)
}

/// Split condition text into tokens, ending with `Eof`
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut rest = source.trim_start();
    loop {
        let position = source.len() - rest.len();
        if rest.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                position,
            });
            return Ok(tokens);
        }
        match token(rest) {
            Ok((next, kind)) => {
                tokens.push(Token { kind, position });
                rest = next.trim_start();
            }
            Err(_) => return Err(lex_error(rest, position)),
        }
    }
}

fn lex_error(rest: &str, position: usize) -> CompileError {
    let first = rest.chars().next().unwrap_or(' ');
    let message = if first == '\'' || first == '"' {
        "unterminated string literal"
    } else if first.is_ascii_digit() {
        "integer literal out of range"
    } else {
        "unexpected character"
    };
    let token: String = if first.is_ascii_digit() {
        rest.chars().take_while(|c| c.is_ascii_digit()).collect()
    } else {
        first.to_string()
    };
    CompileError::Syntax {
        token,
        position,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("entity.type == 'box'"),
            vec![
                TokenKind::Ident("entity".into()),
                TokenKind::Dot,
                TokenKind::Ident("type".into()),
                TokenKind::Eq,
                TokenKind::Str("box".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_two_char_operators_win() {
        assert_eq!(
            kinds("a<=1&&!b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Le,
                TokenKind::Int(1),
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keyword_aliases() {
        assert_eq!(
            kinds("not true and false or x"),
            vec![
                TokenKind::Not,
                TokenKind::True,
                TokenKind::And,
                TokenKind::False,
                TokenKind::Or,
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = tokenize("  dx != 0").unwrap();
        let positions: Vec<_> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![2, 5, 8, 9]);
    }

    #[test]
    fn test_double_quoted_strings() {
        assert_eq!(kinds("\"wall\"")[0], TokenKind::Str("wall".into()));
    }

    #[test]
    fn test_bad_character_reports_position() {
        let err = tokenize("dx @ 1").unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                token: "@".into(),
                position: 3,
                message: "unexpected character".into()
            }
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("is_type('box)").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_integer_overflow() {
        let err = tokenize("99999999999999999999").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
