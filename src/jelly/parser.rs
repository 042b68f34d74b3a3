//! Parser for the jelly text form
//!
//! ```text
//! type   := NUMBER ['{' unit '}'] | TEXT | BOOLEAN | <date keyword>
//!         | '@TYPEVAR' ident | '[' type ']'
//!         | '(' '(' [type {',' type}] ')' '->' type ')'
//!         | '(' type ',' type {',' type} ')'
//!         | 'RECORD' '{' [field ':' type {',' field ':' type}] '}'
//!         | 'TAGGED' string { '(' type ')' | '{' unit '}' }
//! unit   := ('1' | factor) { ('*' | '/') factor }
//! factor := (ident | '@UNITVAR' ident) ['^' ['-'] int]
//! ```

use crate::core::types::DateKind;
use crate::jelly::types::{JellyArg, JellyKind, JellyType, JellyUnit};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Byte offset into the input.
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at offset {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Marker(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Arrow,
    Star,
    Slash,
    Caret,
    Minus,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Marker(name) => write!(f, "'@{}'", name),
            Token::Str(text) => write!(f, "\"{}\"", text),
            Token::Int(n) => write!(f, "'{}'", n),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::Comma => write!(f, "','"),
            Token::Colon => write!(f, "':'"),
            Token::Arrow => write!(f, "'->'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Caret => write!(f, "'^'"),
            Token::Minus => write!(f, "'-'"),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            _ => None,
        };
        if let Some(token) = single {
            chars.next();
            tokens.push((token, offset));
            continue;
        }

        match c {
            '-' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '>'))) {
                    chars.next();
                    tokens.push((Token::Arrow, offset));
                } else {
                    tokens.push((Token::Minus, offset));
                }
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err(error(input.len(), "unterminated string")),
                        },
                        Some((_, c)) => text.push(c),
                        None => return Err(error(offset, "unterminated string")),
                    }
                }
                tokens.push((Token::Str(text), offset));
            }
            '@' => {
                chars.next();
                let name = take_while(&mut chars, is_ident_char);
                if name.is_empty() {
                    return Err(error(offset, "expected a marker after '@'"));
                }
                tokens.push((Token::Marker(name), offset));
            }
            c if c.is_ascii_digit() => {
                let digits = take_while(&mut chars, |c| c.is_ascii_digit());
                let value = digits
                    .parse()
                    .map_err(|_| error(offset, format!("integer {} is too large", digits)))?;
                tokens.push((Token::Int(value), offset));
            }
            c if is_ident_start(c) => {
                let name = take_while(&mut chars, is_ident_char);
                tokens.push((Token::Ident(name), offset));
            }
            c => return Err(error(offset, format!("unexpected character '{}'", c))),
        }
    }

    Ok(tokens)
}

fn take_while<I, P>(chars: &mut std::iter::Peekable<I>, predicate: P) -> String
where
    I: Iterator<Item = (usize, char)>,
    P: Fn(char) -> bool,
{
    let mut text = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !predicate(c) {
            break;
        }
        text.push(c);
        chars.next();
    }
    text
}

fn error(offset: usize, message: impl Into<String>) -> ParseError {
    ParseError {
        offset,
        message: message.into(),
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            end: input.len(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(token, _)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.end)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => error(self.offset(), format!("expected {}, found {}", expected, token)),
            None => error(self.end, format!("expected {}, found end of input", expected)),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of input")),
        }
    }

    fn parse_type(&mut self) -> Result<JellyType, ParseError> {
        let kind = match self.peek() {
            Some(Token::Ident(word)) => {
                let word = word.clone();
                self.pos += 1;
                self.parse_keyword(&word)?
            }
            Some(Token::Marker(marker)) if marker == "TYPEVAR" => {
                self.pos += 1;
                JellyKind::TypeVar(self.expect_ident("a type variable name")?)
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let item = self.parse_type()?;
                self.expect(Token::RBracket)?;
                JellyKind::Array(Box::new(item))
            }
            Some(Token::LParen) => self.parse_parenthesized()?,
            _ => return Err(self.unexpected("a type")),
        };
        Ok(JellyType::new(kind))
    }

    fn parse_keyword(&mut self, word: &str) -> Result<JellyKind, ParseError> {
        if let Some(kind) = DateKind::from_keyword(word) {
            return Ok(JellyKind::Date(kind));
        }
        match word {
            "NUMBER" => {
                if self.peek() == Some(&Token::LBrace) {
                    self.pos += 1;
                    let unit = self.parse_unit_expr()?;
                    self.expect(Token::RBrace)?;
                    Ok(JellyKind::Number(unit))
                } else {
                    Ok(JellyKind::Number(JellyUnit::scalar()))
                }
            }
            "TEXT" => Ok(JellyKind::Text),
            "BOOLEAN" => Ok(JellyKind::Boolean),
            "RECORD" => self.parse_record(),
            "TAGGED" => self.parse_tagged(),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("a type"))
            }
        }
    }

    /// `(` opens either a function or a tuple. The function form is tried
    /// first and abandoned at the first token that does not fit it.
    fn parse_parenthesized(&mut self) -> Result<JellyKind, ParseError> {
        let start = self.pos;
        if self.peek_at(1) == Some(&Token::LParen) {
            match self.parse_function() {
                Ok(kind) => return Ok(kind),
                Err(_) => self.pos = start,
            }
        }
        self.parse_tuple()
    }

    fn parse_function(&mut self) -> Result<JellyKind, ParseError> {
        self.expect(Token::LParen)?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            params.push(self.parse_type()?);
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                params.push(self.parse_type()?);
            }
        }
        self.expect(Token::RParen)?;
        self.expect(Token::Arrow)?;
        let result = self.parse_type()?;
        self.expect(Token::RParen)?;
        Ok(JellyKind::Function(params, Box::new(result)))
    }

    fn parse_tuple(&mut self) -> Result<JellyKind, ParseError> {
        self.expect(Token::LParen)?;
        let mut items = vec![self.parse_type()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            items.push(self.parse_type()?);
        }
        if items.len() < 2 {
            return Err(self.unexpected("',' (tuples have at least two items)"));
        }
        self.expect(Token::RParen)?;
        Ok(JellyKind::Tuple(items))
    }

    fn parse_record(&mut self) -> Result<JellyKind, ParseError> {
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        if self.peek() != Some(&Token::RBrace) {
            loop {
                let name = match self.peek() {
                    Some(Token::Ident(name)) | Some(Token::Str(name)) => name.clone(),
                    _ => return Err(self.unexpected("a field name")),
                };
                self.pos += 1;
                self.expect(Token::Colon)?;
                fields.push((name, self.parse_type()?));
                if self.peek() != Some(&Token::Comma) {
                    break;
                }
                self.pos += 1;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(JellyKind::Record(fields))
    }

    fn parse_tagged(&mut self) -> Result<JellyKind, ParseError> {
        let name = match self.peek() {
            Some(Token::Str(name)) => name.clone(),
            _ => return Err(self.unexpected("a quoted type name")),
        };
        self.pos += 1;

        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    self.pos += 1;
                    args.push(JellyArg::Type(self.parse_type()?));
                    self.expect(Token::RParen)?;
                }
                Some(Token::LBrace) => {
                    self.pos += 1;
                    args.push(JellyArg::Unit(self.parse_unit_expr()?));
                    self.expect(Token::RBrace)?;
                }
                _ => break,
            }
        }
        Ok(JellyKind::Tagged(name, args))
    }

    fn parse_unit_expr(&mut self) -> Result<JellyUnit, ParseError> {
        let mut unit = if self.peek() == Some(&Token::Int(1)) {
            self.pos += 1;
            JellyUnit::scalar()
        } else {
            self.parse_factor()?
        };

        loop {
            let divide = match self.peek() {
                Some(Token::Star) => false,
                Some(Token::Slash) => true,
                _ => return Ok(unit),
            };
            self.pos += 1;
            let offset = self.offset();
            let factor = self.parse_factor()?;
            let factor = if divide {
                factor.checked_raised_to(-1)
            } else {
                Some(factor)
            };
            unit = factor
                .and_then(|factor| unit.checked_multiply(&factor))
                .ok_or_else(|| error(offset, "exponent out of range"))?;
        }
    }

    fn parse_factor(&mut self) -> Result<JellyUnit, ParseError> {
        let base = match self.peek() {
            Some(Token::Ident(name)) => {
                let unit = JellyUnit::named(name.clone());
                self.pos += 1;
                unit
            }
            Some(Token::Marker(marker)) if marker == "UNITVAR" => {
                self.pos += 1;
                JellyUnit::var(self.expect_ident("a unit variable name")?)
            }
            _ => return Err(self.unexpected("a unit")),
        };

        if self.peek() != Some(&Token::Caret) {
            return Ok(base);
        }
        self.pos += 1;
        let negative = self.peek() == Some(&Token::Minus);
        if negative {
            self.pos += 1;
        }
        let offset = self.offset();
        let exponent = match self.peek() {
            Some(Token::Int(n)) => i32::try_from(*n)
                .map_err(|_| error(offset, "exponent out of range"))?,
            _ => return Err(self.unexpected("an exponent")),
        };
        self.pos += 1;
        base.checked_raised_to(if negative { -exponent } else { exponent })
            .ok_or_else(|| error(offset, "exponent out of range"))
    }
}

/// Parses a jelly type from its save form.
pub fn parse_jelly(input: &str) -> Result<JellyType, ParseError> {
    let mut parser = Parser::new(input)?;
    let ty = parser.parse_type()?;
    parser.finish()?;
    Ok(ty)
}

/// Parses a unit such as `kg*m/s^2` or `m/@UNITVAR u`.
pub fn parse_unit(input: &str) -> Result<JellyUnit, ParseError> {
    let mut parser = Parser::new(input)?;
    let unit = parser.parse_unit_expr()?;
    parser.finish()?;
    Ok(unit)
}
