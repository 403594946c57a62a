//! Lexer for the source language.
//!
//! Produces a flat token stream with synthesized `Newline`, `Indent` and
//! `Dedent` tokens so the parser never has to look at whitespace. Newlines
//! inside brackets and after a backslash continuation do not end a logical
//! line.

use crate::ast::BinOp;
use crate::error::CoreError;
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Layout
    Eof,
    Newline,
    Indent,
    Dedent,

    // Identifiers and literals
    Name,
    Int,
    Float,
    Imaginary,
    String,
    Bytes,
    FString,

    // Brackets and punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semi,
    Dot,
    Ellipsis,
    Arrow,
    At,
    Equal,
    ColonEqual,

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Tilde,
    Amper,
    VBar,
    Circumflex,
    LeftShift,
    RightShift,
    EqEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// `+=`, `-=`, ... carrying the underlying operator.
    AugAssign(BinOp),

    // Keywords
    False,
    None,
    True,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,
}

/// A single token. The text is recovered by slicing the source with
/// `span`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, CoreError> {
    ensure_addressable(source.len())?;
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        index: 0,
        tokens: Vec::new(),
        indents: vec![0],
        paren_depth: 0,
        at_line_start: true,
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

/// Spans store `u32` offsets, so longer sources are refused up front.
fn ensure_addressable(len: usize) -> Result<(), CoreError> {
    match u32::try_from(len) {
        Ok(_) => Ok(()),
        Err(_) => Err(CoreError::syntax("source is too large", Span::default())),
    }
}

struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    tokens: Vec<Token>,
    indents: Vec<u32>,
    paren_depth: usize,
    at_line_start: bool,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<(), CoreError> {
        loop {
            if self.at_line_start && self.paren_depth == 0 {
                self.at_line_start = false;
                if !self.handle_indentation()? {
                    continue;
                }
            }

            let Some(ch) = self.peek() else {
                break;
            };
            let start = self.index;

            match ch {
                b' ' | b'\t' | b'\x0c' => self.bump(),
                b'#' => self.skip_comment(),
                b'\r' | b'\n' => {
                    self.consume_newline();
                    if self.paren_depth == 0 {
                        self.push(TokenKind::Newline, start);
                        self.at_line_start = true;
                    }
                }
                b'\\' => {
                    self.bump();
                    match self.peek() {
                        Some(b'\r' | b'\n') => self.consume_newline(),
                        None => {}
                        Some(_) => {
                            return Err(self.error(
                                "unexpected character after line continuation",
                                start,
                            ));
                        }
                    }
                }
                b'0'..=b'9' => self.lex_number(start)?,
                b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(start)?
                }
                b'"' | b'\'' => self.lex_string(start, "")?,
                _ if is_ident_start(self.current_char()) => self.lex_name(start)?,
                _ => self.lex_operator(start)?,
            }
        }

        let end = self.bytes.len();
        if self
            .tokens
            .last()
            .is_some_and(|tok| !matches!(tok.kind, TokenKind::Newline | TokenKind::Dedent))
        {
            self.push(TokenKind::Newline, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, end);
        }
        self.push(TokenKind::Eof, end);
        Ok(())
    }

    /// Measures the indentation of a new line and emits layout tokens.
    /// Returns `false` when the line is blank or holds only a comment.
    fn handle_indentation(&mut self) -> Result<bool, CoreError> {
        let line_start = self.index;
        let mut column: u32 = 0;
        while let Some(ch) = self.peek() {
            match ch {
                b' ' => column += 1,
                b'\t' => column = (column / 8 + 1) * 8,
                b'\x0c' => column = 0,
                _ => break,
            }
            self.bump();
        }

        match self.peek() {
            None => return Ok(true),
            Some(b'#') => {
                self.skip_comment();
                self.consume_newline();
                self.at_line_start = true;
                return Ok(false);
            }
            Some(b'\r' | b'\n') => {
                self.consume_newline();
                self.at_line_start = true;
                return Ok(false);
            }
            Some(_) => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if column > current {
            self.indents.push(column);
            self.push(TokenKind::Indent, line_start);
        } else if column < current {
            while self.indents.last().is_some_and(|&level| level > column) {
                self.indents.pop();
                self.push(TokenKind::Dedent, self.index);
            }
            if self.indents.last().copied() != Some(column) {
                return Err(self.error(
                    "unindent does not match any outer indentation level",
                    line_start,
                ));
            }
        }
        Ok(true)
    }

    fn lex_number(&mut self, start: usize) -> Result<(), CoreError> {
        if self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(b'x' | b'X' | b'o' | b'O' | b'b' | b'B'))
        {
            self.bump();
            self.bump();
            self.eat_while(|c| c.is_ascii_alphanumeric() || c == b'_');
            self.push(TokenKind::Int, start);
            return Ok(());
        }

        let mut kind = TokenKind::Int;
        self.eat_while(|c| c.is_ascii_digit() || c == b'_');
        if self.peek() == Some(b'.') && self.peek_at(1) != Some(b'.') {
            kind = TokenKind::Float;
            self.bump();
            self.eat_while(|c| c.is_ascii_digit() || c == b'_');
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                kind = TokenKind::Float;
                for _ in 0..=sign {
                    self.bump();
                }
                self.eat_while(|c| c.is_ascii_digit() || c == b'_');
            }
        }
        if matches!(self.peek(), Some(b'j' | b'J')) {
            self.bump();
            kind = TokenKind::Imaginary;
        }
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == b'_') {
            return Err(self.error("invalid numeric literal", start));
        }
        self.push(kind, start);
        Ok(())
    }

    fn lex_name(&mut self, start: usize) -> Result<(), CoreError> {
        while let Some(ch) = self.current_char() {
            if is_ident_continue(ch) {
                self.index += ch.len_utf8();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.index];

        if text.len() <= 2
            && text.chars().all(|c| matches!(c, 'r' | 'R' | 'b' | 'B' | 'u' | 'U' | 'f' | 'F'))
            && matches!(self.peek(), Some(b'"' | b'\''))
        {
            return self.lex_string(start, text);
        }

        let kind = keyword(text).unwrap_or(TokenKind::Name);
        self.push(kind, start);
        Ok(())
    }

    fn lex_string(&mut self, start: usize, prefix: &str) -> Result<(), CoreError> {
        let Some(quote) = self.peek() else {
            return Err(self.error("unterminated string literal", start));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let quote_len = if triple { 3 } else { 1 };
        for _ in 0..quote_len {
            self.bump();
        }

        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal", start)),
                Some(b'\\') => {
                    self.bump();
                    if self.peek().is_some() {
                        self.bump();
                    }
                }
                Some(b'\r' | b'\n') if !triple => {
                    return Err(self.error("unterminated string literal", start));
                }
                Some(ch) if ch == quote => {
                    if !triple {
                        self.bump();
                        break;
                    }
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.bump();
                        self.bump();
                        self.bump();
                        break;
                    }
                    self.bump();
                }
                Some(_) => self.bump(),
            }
        }

        let lowered = prefix.to_ascii_lowercase();
        let kind = if lowered.contains('f') {
            TokenKind::FString
        } else if lowered.contains('b') {
            TokenKind::Bytes
        } else {
            TokenKind::String
        };
        self.push(kind, start);
        Ok(())
    }

    fn lex_operator(&mut self, start: usize) -> Result<(), CoreError> {
        use TokenKind::*;

        let rest = &self.bytes[self.index..];
        let three: Option<TokenKind> = match rest {
            [b'*', b'*', b'=', ..] => Some(AugAssign(BinOp::Pow)),
            [b'/', b'/', b'=', ..] => Some(AugAssign(BinOp::FloorDiv)),
            [b'>', b'>', b'=', ..] => Some(AugAssign(BinOp::RShift)),
            [b'<', b'<', b'=', ..] => Some(AugAssign(BinOp::LShift)),
            [b'.', b'.', b'.', ..] => Some(Ellipsis),
            _ => Option::None,
        };
        if let Some(kind) = three {
            self.index += 3;
            self.push(kind, start);
            return Ok(());
        }

        let two: Option<TokenKind> = match rest {
            [b'-', b'>', ..] => Some(Arrow),
            [b':', b'=', ..] => Some(ColonEqual),
            [b'=', b'=', ..] => Some(EqEqual),
            [b'!', b'=', ..] => Some(NotEqual),
            [b'<', b'=', ..] => Some(LessEqual),
            [b'>', b'=', ..] => Some(GreaterEqual),
            [b'<', b'<', ..] => Some(LeftShift),
            [b'>', b'>', ..] => Some(RightShift),
            [b'*', b'*', ..] => Some(DoubleStar),
            [b'/', b'/', ..] => Some(DoubleSlash),
            [b'+', b'=', ..] => Some(AugAssign(BinOp::Add)),
            [b'-', b'=', ..] => Some(AugAssign(BinOp::Sub)),
            [b'*', b'=', ..] => Some(AugAssign(BinOp::Mul)),
            [b'/', b'=', ..] => Some(AugAssign(BinOp::Div)),
            [b'%', b'=', ..] => Some(AugAssign(BinOp::Mod)),
            [b'&', b'=', ..] => Some(AugAssign(BinOp::BitAnd)),
            [b'|', b'=', ..] => Some(AugAssign(BinOp::BitOr)),
            [b'^', b'=', ..] => Some(AugAssign(BinOp::BitXor)),
            [b'@', b'=', ..] => Some(AugAssign(BinOp::MatMul)),
            _ => Option::None,
        };
        if let Some(kind) = two {
            self.index += 2;
            self.push(kind, start);
            return Ok(());
        }

        let kind = match rest.first().copied() {
            Some(b'(') => LParen,
            Some(b')') => RParen,
            Some(b'[') => LBracket,
            Some(b']') => RBracket,
            Some(b'{') => LBrace,
            Some(b'}') => RBrace,
            Some(b',') => Comma,
            Some(b':') => Colon,
            Some(b';') => Semi,
            Some(b'.') => Dot,
            Some(b'@') => At,
            Some(b'=') => Equal,
            Some(b'+') => Plus,
            Some(b'-') => Minus,
            Some(b'*') => Star,
            Some(b'/') => Slash,
            Some(b'%') => Percent,
            Some(b'~') => Tilde,
            Some(b'&') => Amper,
            Some(b'|') => VBar,
            Some(b'^') => Circumflex,
            Some(b'<') => Less,
            Some(b'>') => Greater,
            _ => {
                let width = self.current_char().map_or(1, char::len_utf8);
                self.index += width;
                return Err(self.error("unexpected character", start));
            }
        };
        self.index += 1;
        match kind {
            LParen | LBracket | LBrace => self.paren_depth += 1,
            RParen | RBracket | RBrace => self.paren_depth = self.paren_depth.saturating_sub(1),
            _ => {}
        }
        self.push(kind, start);
        Ok(())
    }

    fn skip_comment(&mut self) {
        self.eat_while(|c| c != b'\n' && c != b'\r');
    }

    fn consume_newline(&mut self) {
        if self.peek() == Some(b'\r') {
            self.bump();
        }
        if self.peek() == Some(b'\n') {
            self.bump();
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::from_offsets(start, self.index.max(start)),
        });
    }

    fn error(&self, message: &str, start: usize) -> CoreError {
        CoreError::syntax(message, Span::from_offsets(start, self.index.max(start + 1)))
    }

    fn eat_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&predicate) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn current_char(&self) -> Option<char> {
        self.source.get(self.index..).and_then(|rest| rest.chars().next())
    }

    fn bump(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }
}

fn is_ident_start(ch: Option<char>) -> bool {
    ch.is_some_and(|c| c == '_' || c.is_alphabetic())
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

fn keyword(text: &str) -> Option<TokenKind> {
    use TokenKind::*;

    let kind = match text {
        "False" => False,
        "None" => None,
        "True" => True,
        "and" => And,
        "as" => As,
        "assert" => Assert,
        "async" => Async,
        "await" => Await,
        "break" => Break,
        "class" => Class,
        "continue" => Continue,
        "def" => Def,
        "del" => Del,
        "elif" => Elif,
        "else" => Else,
        "except" => Except,
        "finally" => Finally,
        "for" => For,
        "from" => From,
        "global" => Global,
        "if" => If,
        "import" => Import,
        "in" => In,
        "is" => Is,
        "lambda" => Lambda,
        "nonlocal" => Nonlocal,
        "not" => Not,
        "or" => Or,
        "pass" => Pass,
        "raise" => Raise,
        "return" => Return,
        "try" => Try,
        "while" => While,
        "with" => With,
        "yield" => Yield,
        _ => return Option::None,
    };
    Some(kind)
}

/// Decodes the value of a string literal token (prefix and quotes
/// included). Unknown escapes are kept verbatim.
pub fn decode_string(raw: &str) -> String {
    let (prefix, inner, _) = split_string(raw);
    if prefix.contains('r') {
        return inner.to_string();
    }
    decode_escapes(inner)
}

/// Splits a string token into its lowercased prefix, the text between the
/// quotes and the byte offset of that text within `raw`.
pub fn split_string(raw: &str) -> (String, &str, usize) {
    let prefix_len = raw.find(['"', '\'']).unwrap_or(0);
    let prefix = raw[..prefix_len].to_ascii_lowercase();
    let body = &raw[prefix_len..];
    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    let inner = body
        .get(quote_len..body.len().saturating_sub(quote_len))
        .unwrap_or("");
    (prefix, inner, prefix_len + quote_len)
}

/// Decodes backslash escapes. Unknown escapes are kept verbatim.
pub fn decode_escapes(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') if !chars.peek().is_some_and(|c| c.is_digit(8)) => out.push('\0'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some('\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some('x') => push_code_point(&mut out, &mut chars, 2, "\\x"),
            Some('u') => push_code_point(&mut out, &mut chars, 4, "\\u"),
            Some('U') => push_code_point(&mut out, &mut chars, 8, "\\U"),
            Some(digit) if digit.is_digit(8) => {
                let mut value = digit.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(next) => {
                            value = value * 8 + next;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn push_code_point(
    out: &mut String,
    chars: &mut core::iter::Peekable<core::str::Chars<'_>>,
    digits: usize,
    escape: &str,
) {
    let mut hex = String::with_capacity(digits);
    for _ in 0..digits {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                hex.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
        Some(ch) if hex.len() == digits => out.push(ch),
        _ => {
            out.push_str(escape);
            out.push_str(&hex);
        }
    }
}

/// Parses an integer literal token, honouring base prefixes and `_`
/// separators.
pub fn parse_int(text: &str) -> Option<i64> {
    parse_magnitude(text).and_then(|value| i64::try_from(value).ok())
}

/// Like [`parse_int`] but keeps the full unsigned range, so the parser can
/// recognise the magnitude of `i64::MIN` under a unary minus.
pub fn parse_magnitude(text: &str) -> Option<u64> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        u64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<u64>().ok()
    }
}

pub fn parse_float(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '_' && *c != 'j' && *c != 'J')
        .collect();
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex should succeed")
            .into_iter()
            .map(|tok| tok.kind)
            .collect()
    }

    #[test]
    fn lexes_simple_assignment() {
        assert_eq!(kinds("x = 5\n"), vec![Name, Equal, Int, Newline, Eof]);
    }

    #[test]
    fn synthesizes_indent_and_dedent() {
        let source = "if x:\n    y = 1\nz = 2\n";
        assert_eq!(
            kinds(source),
            vec![
                If, Name, Colon, Newline, Indent, Name, Equal, Int, Newline, Dedent, Name, Equal,
                Int, Newline, Eof
            ]
        );
    }

    #[test]
    fn closes_open_blocks_at_end_of_input() {
        let source = "def f():\n    return 1";
        let kinds = kinds(source);
        assert_eq!(&kinds[kinds.len() - 3..], &[Newline, Dedent, Eof]);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let source = "x = 1\n\n    # indented comment\ny = 2  # trailing\n";
        assert_eq!(
            kinds(source),
            vec![Name, Equal, Int, Newline, Name, Equal, Int, Newline, Eof]
        );
    }

    #[test]
    fn joins_lines_inside_brackets() {
        let source = "f(1,\n  2)\n";
        assert_eq!(
            kinds(source),
            vec![Name, LParen, Int, Comma, Int, RParen, Newline, Eof]
        );
    }

    #[test]
    fn recognises_number_forms() {
        assert_eq!(
            kinds("1 2.5 .5 1e3 0xff 3j\n"),
            vec![Int, Float, Float, Float, Int, Imaginary, Newline, Eof]
        );
    }

    #[test]
    fn recognises_string_prefixes() {
        assert_eq!(
            kinds("'a' b'b' f'{x}' r\"\\d\" '''t\nq'''\n"),
            vec![String, Bytes, FString, String, String, Newline, Eof]
        );
    }

    #[test]
    fn recognises_compound_operators() {
        assert_eq!(
            kinds("a **= b // c -> d := e != f\n"),
            vec![
                Name,
                AugAssign(BinOp::Pow),
                Name,
                DoubleSlash,
                Name,
                Arrow,
                Name,
                ColonEqual,
                Name,
                NotEqual,
                Name,
                Newline,
                Eof
            ]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = lex("x = 'abc\n").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn rejects_inconsistent_dedent() {
        let err = lex("if x:\n        y = 1\n    z = 2\n").unwrap_err();
        assert!(err.to_string().contains("unindent"));
    }

    #[test]
    fn rejects_stray_characters() {
        let err = lex("x = $\n").unwrap_err();
        assert!(err.to_string().contains("unexpected character"));
    }

    #[test]
    fn decodes_escapes() {
        assert_eq!(decode_string(r#""a\tb\n""#), "a\tb\n");
        assert_eq!(decode_string(r#"'\x41\u00e9'"#), "Aé");
        assert_eq!(decode_string(r#"r'\d+'"#), "\\d+");
        assert_eq!(decode_string(r#"'\q'"#), "\\q");
        assert_eq!(decode_string("'''multi\nline'''"), "multi\nline");
    }

    #[test]
    fn parses_integer_bases() {
        assert_eq!(parse_int("0xff"), Some(255));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_int("99999999999999999999"), Option::None);
        assert_eq!(parse_int("9223372036854775808"), Option::None);
        assert_eq!(parse_magnitude("9223372036854775808"), Some(1 << 63));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn refuses_sources_past_u32_offsets() {
        assert!(ensure_addressable(u32::MAX as usize).is_ok());
        let err = ensure_addressable(u32::MAX as usize + 1).unwrap_err();
        assert!(err.to_string().contains("source is too large"));
    }
}
