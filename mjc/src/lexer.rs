/// Streaming lexer for MicroJava source.
///
/// The [`Lexer`] consumes bytes from any [`std::io::Read`] source and
/// implements [`Iterator`] over [`Token`]s, ending with a single
/// [`TokenKind::Eof`]. Once the end of input is seen, the reader is never
/// touched again.
///
/// | Input                    | Token                                    |
/// |--------------------------|------------------------------------------|
/// | bytes `<= ' '`           | skipped                                  |
/// | `// …`                   | skipped up to the end of the line        |
/// | letter {letter \| digit} | keyword or [`TokenKind::Ident`]          |
/// | digit {digit}            | [`TokenKind::Number`], invalid on overflow |
/// | `'x'`, `'\n'` …          | [`TokenKind::CharConst`]                 |
use std::io::Read;

use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

// ═══════════════════════════════════════════════════════════════════
// Read buffer
// ═══════════════════════════════════════════════════════════════════

/// One byte of lookahead over any `Read`, with position tracking.
struct ReadBuf<R: Read> {
    reader: R,
    current: Option<u8>,
    /// Position of `current`.
    pos: Pos,
}

impl<R: Read> ReadBuf<R> {
    fn new(reader: R) -> Self {
        let mut rb = Self {
            reader,
            current: None,
            pos: Pos::origin(),
        };
        rb.current = rb.read_byte();
        rb
    }

    fn read_byte(&mut self) -> Option<u8> {
        let mut one = [0u8; 1];
        loop {
            match self.reader.read(&mut one) {
                Ok(0) => return None,
                Ok(_) => return Some(one[0]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("read error treated as end of input: {e}");
                    return None;
                }
            }
        }
    }

    fn pos(&self) -> Pos {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.current
    }

    /// Consume one byte and return it, updating position tracking.
    fn advance(&mut self) -> Option<u8> {
        let b = self.current?;
        self.pos = self.pos.step(b);
        self.current = self.read_byte();
        Some(b)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════

pub struct Lexer<R: Read> {
    rb: ReadBuf<R>,
    emitted_eof: bool,
}

impl<R: Read> Lexer<R> {
    /// Create a new lexer over the given readable stream.
    pub fn new(reader: R) -> Self {
        Self {
            rb: ReadBuf::new(reader),
            emitted_eof: false,
        }
    }
}

impl<'a> Lexer<&'a [u8]> {
    /// Create a new lexer from a source string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(source: &'a str) -> Self {
        Self::new(source.as_bytes())
    }
}

impl<R: Read> Lexer<R> {
    fn pos(&self) -> Pos {
        self.rb.pos()
    }

    fn peek(&self) -> Option<u8> {
        self.rb.peek()
    }

    fn advance(&mut self) -> Option<u8> {
        self.rb.advance()
    }

    fn token(&self, kind: TokenKind, start: Pos, lexeme: impl Into<String>) -> Token {
        Token::new(kind, Span::new(start, self.pos()), lexeme)
    }

    /// Consume one byte and produce a token of `kind`.
    fn single(&mut self, kind: TokenKind, start: Pos) -> Token {
        let b = self.advance().unwrap_or_default();
        self.token(kind, start, (b as char).to_string())
    }

    /// Consume `first`, then `=` if present.
    fn with_eq(&mut self, start: Pos, plain: TokenKind, with_eq: TokenKind) -> Token {
        let first = self.advance().unwrap_or_default() as char;
        if self.peek() == Some(b'=') {
            self.advance();
            self.token(with_eq, start, format!("{first}="))
        } else {
            self.token(plain, start, first.to_string())
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b <= b' ') {
            self.advance();
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.advance();
        }
    }

    fn lex_name(&mut self, start: Pos) -> Token {
        let mut name = String::new();
        while let Some(b) = self.peek().filter(u8::is_ascii_alphanumeric) {
            name.push(b as char);
            self.advance();
        }
        self.token(TokenKind::keyword_or_ident(&name), start, name)
    }

    fn lex_number(&mut self, start: Pos) -> Token {
        let mut digits = String::new();
        while let Some(b) = self.peek().filter(u8::is_ascii_digit) {
            digits.push(b as char);
            self.advance();
        }
        match digits.parse::<i32>() {
            Ok(value) => self.token(TokenKind::Number, start, digits).with_value(value),
            Err(_) => self.token(TokenKind::Invalid, start, digits),
        }
    }

    /// `'x'` or `'\n'`, `'\t'`, `'\r'`, where `x` is one UTF-8 encoded
    /// character up to U+FFFF. Anything else is invalid.
    fn lex_char(&mut self, start: Pos) -> Token {
        let mut raw = vec![b'\''];
        self.advance();
        while let Some(b) = self.peek() {
            if b == b'\'' || b == b'\n' {
                break;
            }
            raw.push(b);
            self.advance();
        }
        let closed = self.peek() == Some(b'\'');
        if closed {
            raw.push(b'\'');
            self.advance();
        }
        let body = if closed {
            std::str::from_utf8(&raw[1..raw.len() - 1]).ok()
        } else {
            None
        };
        let mut chars = body.unwrap_or_default().chars();
        let value = match (chars.next(), chars.next(), chars.next()) {
            (Some('\\'), Some('n'), None) => Some('\n'),
            (Some('\\'), Some('t'), None) => Some('\t'),
            (Some('\\'), Some('r'), None) => Some('\r'),
            (Some(c), None, _) => Some(c),
            _ => None,
        }
        .map(u32::from)
        .filter(|&v| v <= 0xFFFF)
        .map(|v| v as i32);
        let lexeme = String::from_utf8_lossy(&raw).into_owned();
        match value {
            Some(v) => self.token(TokenKind::CharConst, start, lexeme).with_value(v),
            None => self.token(TokenKind::Invalid, start, lexeme),
        }
    }

    /// Produce the next token from the stream.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.pos();

        let Some(b) = self.peek() else {
            self.emitted_eof = true;
            return Token::new(TokenKind::Eof, Span::point(start), "");
        };

        match b {
            b'a'..=b'z' | b'A'..=b'Z' => self.lex_name(start),
            b'0'..=b'9' => self.lex_number(start),
            b'\'' => self.lex_char(start),

            b'/' => {
                self.advance();
                if self.peek() == Some(b'/') {
                    self.skip_line_comment();
                    self.next_token()
                } else {
                    self.token(TokenKind::Slash, start, "/")
                }
            }
            b'!' => {
                self.advance();
                if self.peek() == Some(b'=') {
                    self.advance();
                    self.token(TokenKind::Neq, start, "!=")
                } else {
                    self.token(TokenKind::Invalid, start, "!")
                }
            }
            b'=' => self.with_eq(start, TokenKind::Assign, TokenKind::Eql),
            b'<' => self.with_eq(start, TokenKind::Lss, TokenKind::Leq),
            b'>' => self.with_eq(start, TokenKind::Gtr, TokenKind::Geq),

            b'+' => self.single(TokenKind::Plus, start),
            b'-' => self.single(TokenKind::Minus, start),
            b'*' => self.single(TokenKind::Times, start),
            b'%' => self.single(TokenKind::Rem, start),
            b';' => self.single(TokenKind::Semicolon, start),
            b',' => self.single(TokenKind::Comma, start),
            b'.' => self.single(TokenKind::Period, start),
            b'(' => self.single(TokenKind::LParen, start),
            b')' => self.single(TokenKind::RParen, start),
            b'[' => self.single(TokenKind::LBracket, start),
            b']' => self.single(TokenKind::RBracket, start),
            b'{' => self.single(TokenKind::LBrace, start),
            b'}' => self.single(TokenKind::RBrace, start),

            _ => {
                self.advance();
                let lexeme = String::from_utf8_lossy(&[b]).into_owned();
                self.token(TokenKind::Invalid, start, lexeme)
            }
        }
    }
}

impl<R: Read> Iterator for Lexer<R> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.emitted_eof {
            return None;
        }
        Some(self.next_token())
    }
}
