#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(i64),

    // Identifier (user-declared name)
    Ident(std::string::String),

    // Keywords
    Begin,
    Call,
    Const,
    Do,
    End,
    If,
    Odd,
    Procedure,
    Read,
    Then,
    Var,
    While,
    Write,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,

    // Comparison
    Eq,
    Hash, // not-equal
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Punctuation
    Becomes, // :=
    LParen,
    RParen,
    Comma,
    Semicolon,
    Period,

    Eof,
}

impl Token {
    /// Maps an identifier-shaped word to its keyword token, if it is one.
    pub fn keyword(word: &str) -> Option<Token> {
        Some(match word {
            "begin" => Token::Begin,
            "call" => Token::Call,
            "const" => Token::Const,
            "do" => Token::Do,
            "end" => Token::End,
            "if" => Token::If,
            "odd" => Token::Odd,
            "procedure" => Token::Procedure,
            "read" => Token::Read,
            "then" => Token::Then,
            "var" => Token::Var,
            "while" => Token::While,
            "write" => Token::Write,
            _ => return None,
        })
    }

    /// Returns true if this token is one of the relational operators
    /// accepted by a condition.
    pub fn is_relop(&self) -> bool {
        matches!(
            self,
            Token::Eq | Token::Hash | Token::Lt | Token::LtEq | Token::Gt | Token::GtEq
        )
    }

    /// Short kind name, used by diagnostics and the token dumper.
    pub fn kind(&self) -> &'static str {
        use Token::*;
        match self {
            Number(_) => "NUMBER",
            Ident(_) => "IDENT",
            Begin | Call | Const | Do | End | If | Odd | Procedure | Read | Then | Var
            | While | Write => "KEYWORD",
            Plus | Minus | Star | Slash => "OP",
            Eq | Hash | Lt | LtEq | Gt | GtEq => "RELOP",
            Becomes => "ASSIGN",
            LParen | RParen | Comma | Semicolon | Period => "SYMBOL",
            Eof => "EOF",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Begin => write!(f, "begin"),
            Token::Call => write!(f, "call"),
            Token::Const => write!(f, "const"),
            Token::Do => write!(f, "do"),
            Token::End => write!(f, "end"),
            Token::If => write!(f, "if"),
            Token::Odd => write!(f, "odd"),
            Token::Procedure => write!(f, "procedure"),
            Token::Read => write!(f, "read"),
            Token::Then => write!(f, "then"),
            Token::Var => write!(f, "var"),
            Token::While => write!(f, "while"),
            Token::Write => write!(f, "write"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Eq => write!(f, "="),
            Token::Hash => write!(f, "#"),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Becomes => write!(f, ":="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Period => write!(f, "."),
            Token::Eof => write!(f, "EOF"),
        }
    }
}
