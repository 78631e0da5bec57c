//! Recursive descent parser for query token streams
//!
//! ```text
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := unary_expr ((AND | ε) unary_expr)*   -- juxtaposition is AND
//! unary_expr := (NOT | MINUS) primary | primary
//! primary    := '(' or_expr ')'
//!             | FIELD (PHRASE | PREFIX | REGEX | FUZZY | TERM)
//!             | PHRASE | PREFIX | REGEX | FUZZY | TERM
//! ```

use super::ast::Query;
use super::lexer::Token;
use crate::error::{Result, SkaldError};

/// Maximum supported fuzzy edit distance
const MAX_FUZZINESS: u32 = 2;

/// Parse a token stream into a query AST
pub fn parse(tokens: Vec<Token>) -> Result<Query> {
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(&mut self) -> Result<Query> {
        if self.peek() == &Token::Eof {
            return Ok(Query::MatchAll);
        }

        let query = self.parse_or_expr()?;

        if self.peek() != &Token::Eof {
            return Err(SkaldError::InvalidQuery(format!(
                "unexpected token at position {}: {:?}",
                self.pos,
                self.peek()
            )));
        }

        Ok(query)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        token
    }

    fn parse_or_expr(&mut self) -> Result<Query> {
        let mut clauses = vec![self.parse_and_expr()?];

        while self.peek() == &Token::Or {
            self.advance();
            clauses.push(self.parse_and_expr()?);
        }

        if clauses.len() == 1 {
            return Ok(clauses.into_iter().next().unwrap_or(Query::MatchNone));
        }

        Ok(Query::Bool {
            must: Vec::new(),
            should: clauses,
            must_not: Vec::new(),
        })
    }

    fn parse_and_expr(&mut self) -> Result<Query> {
        let mut clauses = vec![self.parse_unary_expr()?];

        loop {
            match self.peek() {
                Token::And => {
                    self.advance();
                    clauses.push(self.parse_unary_expr()?);
                }
                Token::Term(_)
                | Token::Phrase(_)
                | Token::Field(_)
                | Token::Prefix(_)
                | Token::Regex(_)
                | Token::Fuzzy(_, _)
                | Token::LParen
                | Token::Not
                | Token::Minus => {
                    clauses.push(self.parse_unary_expr()?);
                }
                _ => break,
            }
        }

        if clauses.len() == 1 {
            return Ok(clauses.into_iter().next().unwrap_or(Query::MatchNone));
        }

        Ok(Query::Bool {
            must: clauses,
            should: Vec::new(),
            must_not: Vec::new(),
        })
    }

    fn parse_unary_expr(&mut self) -> Result<Query> {
        if matches!(self.peek(), Token::Not | Token::Minus) {
            self.advance();
            let inner = self.parse_primary()?;
            return Ok(Query::Bool {
                must: Vec::new(),
                should: Vec::new(),
                must_not: vec![inner],
            });
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Query> {
        match self.advance() {
            Token::LParen => {
                let expr = self.parse_or_expr()?;
                if self.peek() != &Token::RParen {
                    return Err(SkaldError::InvalidQuery(format!(
                        "expected ')' at position {}, got {:?}",
                        self.pos,
                        self.peek()
                    )));
                }
                self.advance();
                Ok(expr)
            }
            Token::Field(field) => self.parse_field_value(field),
            Token::Phrase(phrase) => Ok(Self::leaf_phrase(None, phrase)),
            Token::Prefix(prefix) => Ok(Self::leaf_prefix(None, prefix)),
            Token::Regex(pattern) => Ok(Self::leaf_regex(None, pattern)),
            Token::Fuzzy(term, fuzziness) => Self::leaf_fuzzy(None, term, fuzziness),
            Token::Term(term) => Ok(Self::leaf_term(None, term)),
            Token::Eof => Err(SkaldError::InvalidQuery(
                "unexpected end of query".to_string(),
            )),
            token => Err(SkaldError::InvalidQuery(format!(
                "unexpected token: {token:?}"
            ))),
        }
    }

    fn parse_field_value(&mut self, field: String) -> Result<Query> {
        match self.peek().clone() {
            Token::Phrase(phrase) => {
                self.advance();
                Ok(Self::leaf_phrase(Some(field), phrase))
            }
            Token::Prefix(prefix) => {
                self.advance();
                Ok(Self::leaf_prefix(Some(field), prefix))
            }
            Token::Regex(pattern) => {
                self.advance();
                Ok(Self::leaf_regex(Some(field), pattern))
            }
            Token::Fuzzy(term, fuzziness) => {
                self.advance();
                Self::leaf_fuzzy(Some(field), term, fuzziness)
            }
            Token::Term(term) => {
                self.advance();
                Ok(Self::leaf_term(Some(field), term))
            }
            _ => Err(SkaldError::InvalidQuery(format!(
                "expected value after field '{field}:'"
            ))),
        }
    }

    fn leaf_term(field: Option<String>, term: String) -> Query {
        if term.is_empty() {
            return Query::MatchNone;
        }
        Query::Term { field, term }
    }

    fn leaf_phrase(field: Option<String>, phrase: String) -> Query {
        if phrase.is_empty() {
            return Query::MatchNone;
        }
        Query::Phrase { field, phrase }
    }

    fn leaf_prefix(field: Option<String>, prefix: String) -> Query {
        if prefix.is_empty() {
            return Query::MatchNone;
        }
        Query::Prefix { field, prefix }
    }

    fn leaf_regex(field: Option<String>, pattern: String) -> Query {
        if pattern.is_empty() {
            return Query::MatchNone;
        }
        Query::Regex { field, pattern }
    }

    fn leaf_fuzzy(field: Option<String>, term: String, fuzziness: u32) -> Result<Query> {
        if fuzziness > MAX_FUZZINESS {
            return Err(SkaldError::InvalidQuery(format!(
                "fuzziness {fuzziness} exceeds maximum of {MAX_FUZZINESS}"
            )));
        }
        if term.is_empty() {
            return Ok(Query::MatchNone);
        }
        Ok(Query::Fuzzy {
            field,
            term,
            fuzziness,
        })
    }
}
