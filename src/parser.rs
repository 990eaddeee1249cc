//! Grammar source parser.
//!
//! Grammars are written one rule per line, alternatives separated by `|`:
//!
//! ```text
//! # arithmetic
//! START -> E
//! E -> E O E | ( E ) | x
//! O -> + | * | `|`
//! ```
//!
//! Backticks escape a literal terminal (so `` `|` `` and `` `->` `` can be
//! used as tokens), `ε` denotes the empty string, and `<A>` is a stub
//! standing for any derivation of the nonterminal `A`. Lines whose first
//! non-blank character is `#` are comments.
//!
//! # Example
//!
//! ```rust
//! use valiant_cfg::parser::parse_grammar;
//!
//! let rules = parse_grammar("S -> a S b | ε").unwrap();
//! assert_eq!(rules.len(), 1);
//! assert_eq!(rules[0].alternatives.len(), 2);
//! ```

use crate::symbol::Symbol;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

/// Parser error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found {found}")]
    Expected {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("line {line}: unterminated escape")]
    UnterminatedEscape { line: usize },
    #[error("line {line}: empty escape")]
    EmptyEscape { line: usize },
    #[error("line {line}: empty alternative (write ε for the empty string)")]
    EmptyAlternative { line: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Token types for the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Arrow,           // ->
    Pipe,            // |
    Newline,
    Word(String),    // any run of non-blank characters
    Escaped(String), // `...`
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Arrow => "`->`".to_string(),
            Token::Pipe => "`|`".to_string(),
            Token::Newline => "end of line".to_string(),
            Token::Word(w) => format!("`{}`", w),
            Token::Escaped(w) => format!("escaped `{}`", w),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// A right-hand-side symbol as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSymbol {
    Name(String),
    Escaped(String),
    Epsilon,
    Stub(String),
}

impl SourceSymbol {
    /// The grammar symbol this source symbol denotes.
    pub fn to_symbol(&self) -> Symbol {
        match self {
            SourceSymbol::Name(name) => Symbol::new(name),
            SourceSymbol::Escaped(name) => Symbol::Original(name.as_str().into()),
            SourceSymbol::Epsilon => Symbol::Epsilon,
            SourceSymbol::Stub(name) => Symbol::stub(&Symbol::new(name)),
        }
    }
}

/// One source line: a left-hand side and its alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRule {
    pub line: usize,
    pub lhs: String,
    pub alternatives: Vec<Vec<SourceSymbol>>,
}

/// Lexer for grammar sources.
struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: usize,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
            line: 1,
            at_line_start: true,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        self.input.next()
    }

    fn skip_blanks(&mut self) {
        while let Some(c) = self.peek() {
            if c == '#' && self.at_line_start {
                // Skip comment to end of line
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if c.is_whitespace() && c != '\n' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> String {
        let mut result = String::new();
        while let Some(c) = self.peek() {
            if predicate(c) {
                result.push(c);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_escape(&mut self) -> ParseResult<String> {
        // Consume opening backtick
        self.advance();
        let mut result = String::new();
        loop {
            match self.advance() {
                Some('`') if result.is_empty() => {
                    return Err(ParseError::EmptyEscape { line: self.line })
                }
                Some('`') => return Ok(result),
                Some('\n') | None => {
                    return Err(ParseError::UnterminatedEscape { line: self.line })
                }
                Some(c) => result.push(c),
            }
        }
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_blanks();

        let token = match self.peek() {
            None => Token::Eof,
            Some('\n') => {
                self.advance();
                self.line += 1;
                self.at_line_start = true;
                return Ok(Token::Newline);
            }
            Some('`') => Token::Escaped(self.read_escape()?),
            Some(_) => {
                let word = self.read_while(|c| !c.is_whitespace());
                match word.as_str() {
                    "->" => Token::Arrow,
                    "|" => Token::Pipe,
                    _ => Token::Word(word),
                }
            }
        };
        self.at_line_start = false;
        Ok(token)
    }
}

/// Split a grammar source into tokens, each tagged with its line number.
pub fn lex(input: &str) -> ParseResult<Vec<(usize, Token)>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let line = lexer.line;
        let token = lexer.next_token()?;
        if token == Token::Eof {
            break;
        }
        tokens.push((line, token));
    }
    Ok(tokens)
}

/// Parser for grammar sources.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    line: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given input.
    pub fn new(input: &'a str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(input);
        let line = lexer.line;
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            line,
        })
    }

    fn advance(&mut self) -> ParseResult<Token> {
        self.line = self.lexer.line;
        let prev = std::mem::replace(&mut self.current, self.lexer.next_token()?);
        Ok(prev)
    }

    fn expected(&self, expected: &str) -> ParseError {
        ParseError::Expected {
            line: self.line,
            expected: expected.to_string(),
            found: self.current.describe(),
        }
    }

    fn skip_newlines(&mut self) -> ParseResult<()> {
        while self.current == Token::Newline {
            self.advance()?;
        }
        Ok(())
    }

    fn symbol(word: String) -> SourceSymbol {
        if word == crate::symbol::EPSILON {
            SourceSymbol::Epsilon
        } else if word.len() > 2 && word.starts_with('<') && word.ends_with('>') {
            SourceSymbol::Stub(word[1..word.len() - 1].to_string())
        } else {
            SourceSymbol::Name(word)
        }
    }

    /// Parse a single rule.
    pub fn parse_rule(&mut self) -> ParseResult<SourceRule> {
        let line = self.line;
        let lhs = match &self.current {
            Token::Word(w) => w.clone(),
            _ => return Err(self.expected("a nonterminal")),
        };
        self.advance()?;

        if self.current != Token::Arrow {
            return Err(self.expected("`->`"));
        }
        self.advance()?;

        let mut alternatives = Vec::new();
        let mut current = Vec::new();
        loop {
            match self.current.clone() {
                Token::Word(w) => current.push(Self::symbol(w)),
                Token::Escaped(w) => current.push(SourceSymbol::Escaped(w)),
                Token::Pipe => {
                    if current.is_empty() {
                        return Err(ParseError::EmptyAlternative { line });
                    }
                    alternatives.push(std::mem::take(&mut current));
                }
                Token::Newline | Token::Eof => break,
                Token::Arrow => return Err(self.expected("a symbol")),
            }
            self.advance()?;
        }
        if current.is_empty() {
            return Err(ParseError::EmptyAlternative { line });
        }
        alternatives.push(current);

        Ok(SourceRule {
            line,
            lhs,
            alternatives,
        })
    }

    /// Parse every rule up to the end of input.
    pub fn parse_grammar(&mut self) -> ParseResult<Vec<SourceRule>> {
        let mut rules = Vec::new();
        self.skip_newlines()?;
        while self.current != Token::Eof {
            rules.push(self.parse_rule()?);
            self.skip_newlines()?;
        }
        Ok(rules)
    }
}

/// Parse a grammar source into rules.
pub fn parse_grammar(input: &str) -> ParseResult<Vec<SourceRule>> {
    let mut parser = Parser::new(input)?;
    parser.parse_grammar()
}

/// Parse a single rule from a string.
pub fn parse_rule(input: &str) -> ParseResult<SourceRule> {
    let mut parser = Parser::new(input)?;
    parser.skip_newlines()?;
    parser.parse_rule()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> SourceSymbol {
        SourceSymbol::Name(s.to_string())
    }

    #[test]
    fn test_parse_single_rule() {
        let rule = parse_rule("S -> a S b").unwrap();
        assert_eq!(rule.lhs, "S");
        assert_eq!(rule.alternatives, vec![vec![name("a"), name("S"), name("b")]]);
    }

    #[test]
    fn test_parse_alternatives() {
        let rule = parse_rule("O -> + | * | -").unwrap();
        assert_eq!(rule.alternatives.len(), 3);
        assert_eq!(rule.alternatives[2], vec![name("-")]);
    }

    #[test]
    fn test_parse_escapes_epsilon_and_stubs() {
        let rule = parse_rule("A -> `|` `->` | ε | <B> x").unwrap();
        assert_eq!(
            rule.alternatives,
            vec![
                vec![
                    SourceSymbol::Escaped("|".to_string()),
                    SourceSymbol::Escaped("->".to_string())
                ],
                vec![SourceSymbol::Epsilon],
                vec![SourceSymbol::Stub("B".to_string()), name("x")],
            ]
        );
    }

    #[test]
    fn test_parse_grammar_with_comments() {
        let rules = parse_grammar(
            r#"
            # comment line
            START -> E

            E -> E + E | x # y
            "#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].line, 3);
        assert_eq!(rules[1].lhs, "E");
        // Only a leading `#` starts a comment
        assert_eq!(rules[1].alternatives[1], vec![name("x"), name("#"), name("y")]);
    }

    #[test]
    fn test_angle_brackets_alone_are_terminals() {
        let rule = parse_rule("C -> < | <= | <>").unwrap();
        assert_eq!(rule.alternatives[2], vec![name("<>")]);
    }

    #[test]
    fn test_missing_arrow() {
        let err = parse_rule("S a b").unwrap_err();
        assert!(matches!(err, ParseError::Expected { ref expected, .. } if expected == "`->`"));
    }

    #[test]
    fn test_empty_alternative() {
        assert_eq!(
            parse_rule("S -> a |").unwrap_err(),
            ParseError::EmptyAlternative { line: 1 }
        );
        assert_eq!(
            parse_rule("S -> | a").unwrap_err(),
            ParseError::EmptyAlternative { line: 1 }
        );
        assert!(parse_rule("S ->").is_err());
    }

    #[test]
    fn test_unterminated_escape() {
        assert_eq!(
            parse_grammar("S -> `a\nT -> b").unwrap_err(),
            ParseError::UnterminatedEscape { line: 1 }
        );
    }

    #[test]
    fn test_lex_tags_lines() {
        let tokens = lex("S -> a\nT -> `|`").unwrap();
        assert_eq!(tokens[0], (1, Token::Word("S".to_string())));
        assert_eq!(tokens[3], (1, Token::Newline));
        assert_eq!(tokens[6], (2, Token::Escaped("|".to_string())));
    }
}
