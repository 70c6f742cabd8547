//! Query language.
//!
//! A query is a boolean combination of `field:value` clauses:
//!
//! ```text
//! query   := or
//! or      := and ( "OR" and )*
//! and     := unary ( ["AND"] unary )*        juxtaposition means AND
//! unary   := "NOT" unary | primary
//! primary := "(" or ")" | clause | "*" | "*:*" | ".*"
//! clause  := field ":" value
//! value   := word | '"' literal '"'
//! ```
//!
//! Precedence from loosest to tightest: `OR`, `AND`, `NOT`, parentheses.
//! Operators are upper-case keywords (`&&` and `||` are accepted too);
//! `and`/`or` are ordinary words.
//!
//! In a bare word `*` matches any run of characters and `?` exactly one;
//! a backslash makes the next character literal (`name:a\*b`, `a\:b:c`).
//! Quoted values are literal and may contain blanks and `\"`.
//! `field:*` matches every document that has the field. `*`, `*:*` and `.*`
//! on their own match every document. Matching is case-sensitive.

use std::fmt;

use crate::search::error::{QueryError, QueryResult};

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// every document
    All,
    /// field value matches a pattern
    Term { field: String, pattern: Pattern },
    /// field exists with any value
    Present { field: String },
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    /// parse a query string
    pub fn parse(input: &str) -> QueryResult<Query> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(QueryError::Empty);
        }

        let mut parser = Parser { tokens, pos: 0 };
        let query = parser.parse_or()?;

        match parser.peek() {
            None => Ok(query),
            Some(token) => Err(token.unexpected()),
        }
    }
}

/// One element of a value pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece {
    Char(char),
    /// `?`
    AnyOne,
    /// `*`
    AnyRun,
}

/// A value pattern with `*` and `?` wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pieces: Vec<Piece>,
}

impl Pattern {
    /// pattern matching exactly `value`
    pub fn literal(value: &str) -> Self {
        Self {
            pieces: value.chars().map(Piece::Char).collect(),
        }
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// the plain value if the pattern has no wildcards
    pub fn as_literal(&self) -> Option<String> {
        self.pieces
            .iter()
            .map(|piece| match piece {
                Piece::Char(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn matches(&self, value: &str) -> bool {
        let chars: Vec<char> = value.chars().collect();
        match_pieces(&chars, &self.pieces)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in &self.pieces {
            match piece {
                Piece::Char(c) if matches!(c, '*' | '?' | '\\') => write!(f, "\\{}", c)?,
                Piece::Char(c) => write!(f, "{}", c)?,
                Piece::AnyOne => f.write_str("?")?,
                Piece::AnyRun => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

/// iterative glob matching with single-star backtracking
fn match_pieces(s: &[char], p: &[Piece]) -> bool {
    let (mut si, mut pi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        match p.get(pi) {
            Some(Piece::AnyRun) => {
                star = Some((pi, si));
                pi += 1;
            }
            Some(Piece::AnyOne) => {
                si += 1;
                pi += 1;
            }
            Some(Piece::Char(c)) if *c == s[si] => {
                si += 1;
                pi += 1;
            }
            _ => match star {
                Some((star_pi, star_si)) => {
                    pi = star_pi + 1;
                    si = star_si + 1;
                    star = Some((star_pi, star_si + 1));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|piece| *piece == Piece::AnyRun)
}

// ==================== Tokenizer ====================

/// a character of a bare word; escaped characters are never special
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WordChar {
    c: char,
    escaped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Not,
    /// bare word, possibly followed by a quoted value (`field:"..."`)
    Word { chars: Vec<WordChar>, quoted: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    position: usize,
    text: String,
}

impl Token {
    fn unexpected(&self) -> QueryError {
        QueryError::UnexpectedToken {
            position: self.position,
            found: self.text.clone(),
        }
    }
}

fn tokenize(input: &str) -> QueryResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = match c {
            '(' => {
                i += 1;
                TokenKind::LParen
            }
            ')' => {
                i += 1;
                TokenKind::RParen
            }
            '"' => {
                let (literal, next) = read_quoted(&chars, i)?;
                i = next;
                TokenKind::Word {
                    chars: Vec::new(),
                    quoted: Some(literal),
                }
            }
            _ => {
                let mut word = Vec::new();
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    if c == '\\' {
                        let escaped = *chars.get(i + 1).ok_or(QueryError::DanglingEscape)?;
                        word.push(WordChar { c: escaped, escaped: true });
                        i += 2;
                    } else {
                        word.push(WordChar { c, escaped: false });
                        i += 1;
                    }
                }

                let quoted = match (word.last(), chars.get(i)) {
                    (Some(WordChar { c: ':', escaped: false }), Some('"')) => {
                        let (literal, next) = read_quoted(&chars, i)?;
                        i = next;
                        Some(literal)
                    }
                    _ => None,
                };

                keyword(&word, quoted.is_some()).unwrap_or(TokenKind::Word { chars: word, quoted })
            }
        };

        tokens.push(Token {
            kind,
            position: start,
            text: chars[start..i].iter().collect(),
        });
    }

    Ok(tokens)
}

/// read `"..."` starting at `start`; returns the literal and the index after the closing quote
fn read_quoted(chars: &[char], start: usize) -> QueryResult<(String, usize)> {
    let mut literal = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((literal, i + 1)),
            '\\' => {
                let escaped = *chars.get(i + 1).ok_or(QueryError::DanglingEscape)?;
                literal.push(escaped);
                i += 2;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    Err(QueryError::UnterminatedQuote { position: start })
}

fn keyword(word: &[WordChar], quoted: bool) -> Option<TokenKind> {
    if quoted || word.iter().any(|wc| wc.escaped) {
        return None;
    }

    let text: String = word.iter().map(|wc| wc.c).collect();
    match text.as_str() {
        "AND" | "&&" => Some(TokenKind::And),
        "OR" | "||" => Some(TokenKind::Or),
        "NOT" => Some(TokenKind::Not),
        _ => None,
    }
}

// ==================== Parser ====================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &'static str) -> QueryResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(QueryError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> QueryResult<Query> {
        let mut branches = vec![self.parse_and()?];
        while self.eat(&TokenKind::Or) {
            branches.push(self.parse_and()?);
        }

        Ok(flatten(branches, Query::Or))
    }

    fn parse_and(&mut self) -> QueryResult<Query> {
        let mut operands = vec![self.parse_unary()?];
        loop {
            if self.eat(&TokenKind::And) {
                operands.push(self.parse_unary()?);
                continue;
            }
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Word { .. }) | Some(TokenKind::LParen) | Some(TokenKind::Not) => {
                    operands.push(self.parse_unary()?);
                }
                _ => break,
            }
        }

        Ok(flatten(operands, Query::And))
    }

    fn parse_unary(&mut self) -> QueryResult<Query> {
        if self.eat(&TokenKind::Not) {
            return Ok(Query::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> QueryResult<Query> {
        let token = self.next("a clause or '('")?;
        match token.kind {
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                let closing = self.next("')'")?;
                if closing.kind != TokenKind::RParen {
                    return Err(closing.unexpected());
                }
                Ok(inner)
            }
            TokenKind::Word { ref chars, ref quoted } => clause(chars, quoted.as_deref(), &token),
            _ => Err(token.unexpected()),
        }
    }
}

fn flatten(mut items: Vec<Query>, combine: fn(Vec<Query>) -> Query) -> Query {
    if items.len() == 1 {
        items.remove(0)
    } else {
        combine(items)
    }
}

fn clause(word: &[WordChar], quoted: Option<&str>, token: &Token) -> QueryResult<Query> {
    let plain = |wc: &WordChar, c: char| wc.c == c && !wc.escaped;

    if quoted.is_none() {
        let text: String = word.iter().map(|wc| wc.c).collect();
        let unescaped = word.iter().all(|wc| !wc.escaped);
        if unescaped && matches!(text.as_str(), "*" | "*:*" | ".*") {
            return Ok(Query::All);
        }
    }

    let missing_field = || QueryError::MissingField {
        position: token.position,
        clause: token.text.clone(),
    };

    let colon = word.iter().position(|wc| plain(wc, ':')).ok_or_else(missing_field)?;
    if colon == 0 {
        return Err(missing_field());
    }
    let field: String = word[..colon].iter().map(|wc| wc.c).collect();
    let value = &word[colon + 1..];

    if let Some(literal) = quoted {
        return Ok(Query::Term {
            field,
            pattern: Pattern::literal(literal),
        });
    }

    if value.is_empty() {
        return Err(QueryError::MissingValue {
            position: token.position,
            clause: token.text.clone(),
        });
    }

    if value.len() == 1 && plain(&value[0], '*') {
        return Ok(Query::Present { field });
    }

    let pieces = value
        .iter()
        .map(|wc| match (wc.c, wc.escaped) {
            ('*', false) => Piece::AnyRun,
            ('?', false) => Piece::AnyOne,
            (c, _) => Piece::Char(c),
        })
        .collect();

    Ok(Query::Term {
        field,
        pattern: Pattern { pieces },
    })
}
