use crate::frontend::lexer::{LexerError, Spanned};
use crate::frontend::token::Token;
use std::fmt::Write;

pub struct TokenDumper {
    pub color: bool,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self { color: true }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const RED: &'static str = "\x1b[31m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";
    const BLU: &'static str = "\x1b[34m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    /// Renders one line per token, then one line per lexical error.
    pub fn render(&self, tokens: &[Spanned], errors: &[LexerError]) -> String {
        let mut out = String::new();
        for s in tokens {
            self.render_one(&mut out, s);
        }
        for e in errors {
            let (colr, reset) = self.paint(Self::RED);
            let _ = writeln!(out, "{}{}{}", colr, e, reset);
        }
        out
    }

    pub fn dump(&self, tokens: &[Spanned], errors: &[LexerError]) {
        print!("{}", self.render(tokens, errors));
    }

    fn render_one(&self, out: &mut String, s: &Spanned) {
        let (colr, reset) = self.paint(self.color_of(&s.token));
        let _ = writeln!(
            out,
            "[{:02}:{:02}] {}{:<8} {}{}",
            s.span.line,
            s.span.col,
            colr,
            s.token.kind(),
            s.token,
            reset
        );
    }

    fn paint(&self, colr: &'static str) -> (&'static str, &'static str) {
        if self.color {
            (colr, Self::RESET)
        } else {
            ("", "")
        }
    }

    fn color_of(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => Self::DIM,
            Number(_) => Self::CYN,
            Ident(_) => Self::YEL,
            Plus | Minus | Star | Slash => Self::MAG,
            t if t.is_relop() => Self::MAG,
            Begin | Call | Const | Do | End | If | Odd | Procedure | Read | Then | Var
            | While | Write => Self::BLU,
            _ => Self::RESET,
        }
    }
}
