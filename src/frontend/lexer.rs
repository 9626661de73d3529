use crate::frontend::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// One lexical diagnostic. Several may be collected in a single pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[Error] Line {line}, Column {col}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

/// Output of a recovering scan: every token that could be formed plus every
/// diagnostic met on the way. The token list always ends with `Token::Eof`.
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<Spanned>,
    pub errors: Vec<LexerError>,
}

impl Lexed {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    errors: Vec<LexerError>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            errors: Vec::new(),
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn report(&mut self, span: Span, message: impl Into<String>) {
        let error = LexerError {
            message: message.into(),
            line: span.line,
            col: span.col,
        };
        tracing::debug!(%error, "lexical error recovered");
        self.errors.push(error);
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Skips a `{ ... }` comment. The opening brace is the current char.
    fn skip_comment(&mut self) {
        let start = self.span();
        self.advance();
        loop {
            match self.current() {
                Some('}') => {
                    self.advance();
                    return;
                }
                Some(_) => {
                    self.advance();
                }
                None => {
                    self.report(start, "unterminated comment");
                    return;
                }
            }
        }
    }

    fn read_number(&mut self) -> Token {
        let start = self.span();

        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Out-of-range literals still produce a token so the parser does not
        // trip over a hole in the stream.
        match digits.parse::<i32>() {
            Ok(value) => Token::Number(value as i64),
            Err(_) => {
                self.report(
                    start,
                    format!("number {} exceeds the 32-bit integer range", digits),
                );
                Token::Number(i32::MAX as i64)
            }
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::keyword(&ident).unwrap_or(Token::Ident(ident))
    }

    fn read_operator(&mut self) -> Option<Token> {
        let ch = self.current()?;
        let next = self.peek();

        let token = match (ch, next) {
            (':', Some('=')) => {
                self.advance();
                self.advance();
                Token::Becomes
            }
            ('<', Some('=')) => {
                self.advance();
                self.advance();
                Token::LtEq
            }
            ('>', Some('=')) => {
                self.advance();
                self.advance();
                Token::GtEq
            }
            _ => {
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '=' => Token::Eq,
                    '#' => Token::Hash,
                    '<' => Token::Lt,
                    '>' => Token::Gt,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    ';' => Token::Semicolon,
                    '.' => Token::Period,
                    _ => return None,
                };
                self.advance();
                token
            }
        };

        Some(token)
    }

    /// Scans the whole source, recovering from bad characters by skipping them.
    pub fn tokenize_recovering(mut self) -> Lexed {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();

            match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('{') => self.skip_comment(),
                Some(ch) if ch.is_ascii_digit() => {
                    let token = self.read_number();
                    tokens.push(Spanned { token, span });
                }
                Some(ch) if ch.is_ascii_alphabetic() => {
                    let token = self.read_identifier();
                    tokens.push(Spanned { token, span });
                }
                Some(ch) => {
                    if let Some(token) = self.read_operator() {
                        tokens.push(Spanned { token, span });
                    } else {
                        self.report(span, format!("unexpected character: '{}'", ch));
                        self.advance();
                    }
                }
            }
        }

        tracing::trace!(
            tokens = tokens.len(),
            errors = self.errors.len(),
            "source scanned"
        );

        Lexed {
            tokens,
            errors: self.errors,
        }
    }

    /// Scans the source and fails with every collected diagnostic if any
    /// were reported.
    pub fn tokenize(self) -> Result<Vec<Spanned>, Vec<LexerError>> {
        let lexed = self.tokenize_recovering();
        if lexed.has_errors() {
            Err(lexed.errors)
        } else {
            Ok(lexed.tokens)
        }
    }
}
