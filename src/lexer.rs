use crate::source_location::{SourceLocation, SourceSpan};
use crate::token::{Token, TokenKind};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
#[error("Unexpected character '{character}' at line {line}, column {column}")]
pub struct LexError {
    pub character: char,
    pub line: usize,
    pub column: usize,
    #[label("unexpected character")]
    pub span: SourceSpan,
}

/// Scans source text into tokens.
///
/// Operators are tried before their one-character prefixes (`>=` before `>`),
/// and every identifier-shaped lexeme is checked against the reserved words,
/// so keyword spellings never come out as `Identifier`. The iterator yields a
/// final `Eof` token, or stops after the first `LexError`.
pub struct Lexer<'a> {
    source: &'a str,
    loc: SourceLocation,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            loc: SourceLocation::new(),
            finished: false,
        }
    }

    fn is_at_end(&self) -> bool {
        self.source.is_empty()
    }

    fn peek(&self) -> char {
        self.source.chars().next().unwrap_or('\0')
    }

    fn advance_char(&mut self) -> char {
        let c = self.peek();
        self.source = &self.source[c.len_utf8()..];
        self.loc.advance(c);
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.advance_char();
            true
        } else {
            false
        }
    }

    fn span_from(&self, start: SourceLocation) -> SourceSpan {
        SourceSpan::new(start, self.loc.clone())
    }

    fn token(&self, kind: TokenKind, lexeme: &str, start: SourceLocation) -> Token {
        Token::new(kind, lexeme, self.span_from(start))
    }

    fn error(&self, character: char, start: SourceLocation) -> LexError {
        LexError {
            character,
            line: start.line,
            column: start.column,
            span: self.span_from(start),
        }
    }

    // string := '"' [^"]* '"'
    // the body may contain newlines; there are no escape sequences
    fn scan_string(&mut self, start: SourceLocation) -> Result<Token, LexError> {
        let body_len = match self.source.find('"') {
            Some(len) => len,
            None => {
                // an unterminated quote matches no pattern at all
                return Err(self.error('"', start));
            }
        };

        let body = &self.source[..body_len];
        self.source = &self.source[body_len + 1..];
        self.loc.advance_str(body);
        self.loc.advance('"');

        Ok(Token::new(TokenKind::String, body, self.span_from(start)))
    }

    fn scan_number(&mut self, first_digit: char, start: SourceLocation) -> Token {
        let mut lexeme = String::from(first_digit);

        while !self.is_at_end() && self.peek().is_ascii_digit() {
            lexeme.push(self.advance_char());
        }

        Token::new(TokenKind::Number, lexeme, self.span_from(start))
    }

    fn is_identifier_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    fn scan_identifier(&mut self, first_char: char, start: SourceLocation) -> Token {
        let mut lexeme = String::from(first_char);

        while !self.is_at_end() && Self::is_identifier_char(self.peek()) {
            lexeme.push(self.advance_char());
        }

        let kind = TokenKind::from_keyword_lexeme(&lexeme).unwrap_or(TokenKind::Identifier);

        Token::new(kind, lexeme, self.span_from(start))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        // consume characters until either eof or the next lexeme has been found
        while !self.is_at_end() {
            let c_loc = self.loc.clone();
            let c = self.advance_char();

            let token = match c {
                // two-character lexemes
                '>' => {
                    if self.match_char('=') {
                        self.token(TokenKind::GreaterEqual, ">=", c_loc)
                    } else {
                        self.token(TokenKind::Greater, ">", c_loc)
                    }
                }
                '<' => {
                    if self.match_char('=') {
                        self.token(TokenKind::LessEqual, "<=", c_loc)
                    } else {
                        self.token(TokenKind::Less, "<", c_loc)
                    }
                }
                '=' => {
                    if self.match_char('=') {
                        self.token(TokenKind::EqualEqual, "==", c_loc)
                    } else {
                        self.token(TokenKind::Equal, "=", c_loc)
                    }
                }
                '!' => {
                    if self.match_char('=') {
                        self.token(TokenKind::BangEqual, "!=", c_loc)
                    } else {
                        self.finished = true;
                        return Some(Err(self.error(c, c_loc)));
                    }
                }

                // string literals
                '"' => match self.scan_string(c_loc) {
                    Ok(token) => token,
                    Err(error) => {
                        self.finished = true;
                        return Some(Err(error));
                    }
                },

                // whitespace
                ' ' | '\n' | '\t' | '\r' => continue,

                // comment to end of line
                '#' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance_char();
                    }
                    continue;
                }

                // single-character lexemes
                '+' => self.token(TokenKind::Plus, "+", c_loc),
                '-' => self.token(TokenKind::Minus, "-", c_loc),
                '*' => self.token(TokenKind::Star, "*", c_loc),
                '/' => self.token(TokenKind::Slash, "/", c_loc),
                '(' => self.token(TokenKind::LeftParen, "(", c_loc),
                ')' => self.token(TokenKind::RightParen, ")", c_loc),
                '[' => self.token(TokenKind::LeftBracket, "[", c_loc),
                ']' => self.token(TokenKind::RightBracket, "]", c_loc),
                ',' => self.token(TokenKind::Comma, ",", c_loc),

                // catch-all for numbers and identifiers
                c => {
                    if c.is_ascii_digit() {
                        self.scan_number(c, c_loc)
                    } else if c == '_' || c.is_ascii_alphabetic() {
                        self.scan_identifier(c, c_loc)
                    } else {
                        self.finished = true;
                        return Some(Err(self.error(c, c_loc)));
                    }
                }
            };

            return Some(Ok(token));
        }

        self.finished = true;
        let eof = SourceSpan::new(self.loc.clone(), self.loc.clone());
        Some(Ok(Token::new(TokenKind::Eof, "", eof)))
    }
}

/// Scans all of `source`, ending with an `Eof` token.
pub fn scan(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).collect()
}
