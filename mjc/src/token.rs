/// Token types produced by the MicroJava lexer.
use crate::span::Span;

/// The kind of a lexical token.
///
/// Payloads (identifier text, numeric value) live on [`Token`] so the kind
/// stays `Copy` and can be matched against [`TokenSet`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    /// Unrecognized character or malformed literal.
    Invalid,
    Ident,
    Number,
    CharConst,
    Plus,
    Minus,
    Times,
    Slash,
    Rem,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
    Assign,
    Semicolon,
    Comma,
    Period,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Class,
    Else,
    Final,
    If,
    New,
    Print,
    Program,
    Read,
    Return,
    Void,
    While,
    Eof,
}

/// Keywords, sorted for binary search.
const KEYWORDS: [(&str, TokenKind); 11] = [
    ("class", TokenKind::Class),
    ("else", TokenKind::Else),
    ("final", TokenKind::Final),
    ("if", TokenKind::If),
    ("new", TokenKind::New),
    ("print", TokenKind::Print),
    ("program", TokenKind::Program),
    ("read", TokenKind::Read),
    ("return", TokenKind::Return),
    ("void", TokenKind::Void),
    ("while", TokenKind::While),
];

impl TokenKind {
    /// Classify a name as keyword or identifier.
    pub fn keyword_or_ident(name: &str) -> TokenKind {
        KEYWORDS
            .binary_search_by(|(kw, _)| (*kw).cmp(name))
            .map_or(TokenKind::Ident, |i| KEYWORDS[i].1)
    }

    /// Human-readable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Invalid => "invalid token",
            Self::Ident => "identifier",
            Self::Number => "number",
            Self::CharConst => "character constant",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Times => "*",
            Self::Slash => "/",
            Self::Rem => "%",
            Self::Eql => "==",
            Self::Neq => "!=",
            Self::Lss => "<",
            Self::Leq => "<=",
            Self::Gtr => ">",
            Self::Geq => ">=",
            Self::Assign => "=",
            Self::Semicolon => ";",
            Self::Comma => ",",
            Self::Period => ".",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Class => "class",
            Self::Else => "else",
            Self::Final => "final",
            Self::If => "if",
            Self::New => "new",
            Self::Print => "print",
            Self::Program => "program",
            Self::Read => "read",
            Self::Return => "return",
            Self::Void => "void",
            Self::While => "while",
            Self::Eof => "end of file",
        }
    }
}

/// A set of token kinds, used for FIRST sets and error recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSet(u64);

impl TokenSet {
    pub const EMPTY: TokenSet = TokenSet(0);

    pub const fn of(kinds: &[TokenKind]) -> TokenSet {
        let mut bits = 0u64;
        let mut i = 0;
        while i < kinds.len() {
            bits |= 1 << kinds[i] as u8;
            i += 1;
        }
        TokenSet(bits)
    }

    pub const fn contains(self, kind: TokenKind) -> bool {
        self.0 & (1 << kind as u8) != 0
    }

    pub const fn union(self, other: TokenSet) -> TokenSet {
        TokenSet(self.0 | other.0)
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Source text of this token.
    pub lexeme: String,
    /// Value of a number or character constant, 0 otherwise.
    pub value: i32,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
            value: 0,
        }
    }

    pub fn with_value(mut self, value: i32) -> Self {
        self.value = value;
        self
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Placeholder used before the first token has been scanned.
    pub fn none() -> Self {
        Self::new(TokenKind::Invalid, Span::default(), "")
    }
}
