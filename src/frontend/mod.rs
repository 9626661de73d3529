pub mod lexer;
pub mod token;
pub mod token_dumper;

pub use lexer::{Lexed, Lexer, LexerError, Span, Spanned};
pub use token::Token;
