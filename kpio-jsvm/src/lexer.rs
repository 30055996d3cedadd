//! JavaScript lexer (tokenizer).

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{ParseError, ParseResult};
use crate::token::{Span, Token, TokenKind};

/// JavaScript lexer.
///
/// Works on characters rather than bytes so that columns reported for
/// non-ASCII sources line up with what an editor shows.
pub struct Lexer {
    /// Source characters.
    chars: Vec<char>,
    /// Current position.
    pos: usize,
    /// Current line (1-based).
    line: usize,
    /// Current column (1-based).
    column: usize,
    /// Start of current token.
    token_start: usize,
    /// Start line of current token.
    token_line: usize,
    /// Start column of current token.
    token_column: usize,
    /// A line terminator was consumed since the last reset.
    newline_before: bool,
    /// A line terminator precedes the current token.
    token_newline: bool,
    /// Open `{` count for every template substitution we are inside.
    template_braces: Vec<usize>,
}

impl Lexer {
    /// Create a new lexer.
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_line: 1,
            token_column: 1,
            newline_before: false,
            token_newline: false,
            template_braces: Vec::new(),
        }
    }

    /// Tokenize the entire source.
    pub fn tokenize(&mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.newline_before = false;
        self.skip_whitespace_and_comments()?;

        self.token_start = self.pos;
        self.token_line = self.line;
        self.token_column = self.column;
        self.token_newline = self.newline_before;

        if self.is_eof() {
            if !self.template_braces.is_empty() {
                return Err(self.error("Unterminated template literal"));
            }
            return Ok(self.make_token(TokenKind::Eof));
        }

        let ch = self.current();

        if ch.is_ascii_digit() || (ch == '.' && self.peek().is_ascii_digit()) {
            return self.scan_number();
        }

        if ch == '"' || ch == '\'' {
            return self.scan_string(ch);
        }

        if ch == '`' {
            self.advance();
            return self.scan_template_chunk();
        }

        if is_id_start(ch) {
            return Ok(self.scan_identifier());
        }

        // Template substitutions close with a brace that resumes the literal.
        if ch == '}' {
            if let Some(depth) = self.template_braces.last_mut() {
                if *depth == 0 {
                    self.template_braces.pop();
                    self.advance();
                    return self.scan_template_chunk();
                }
                *depth -= 1;
            }
        } else if ch == '{' {
            if let Some(depth) = self.template_braces.last_mut() {
                *depth += 1;
            }
        }

        Ok(self.scan_punctuator())
    }

    /// Skip whitespace and comments.
    fn skip_whitespace_and_comments(&mut self) -> ParseResult<()> {
        loop {
            while !self.is_eof() && is_whitespace(self.current()) {
                self.advance();
            }

            if self.current() == '/' && self.peek() == '/' {
                while !self.is_eof() && !is_line_terminator(self.current()) {
                    self.advance();
                }
                continue;
            }

            if self.current() == '/' && self.peek() == '*' {
                let start = self.span_here();
                self.advance();
                self.advance();
                loop {
                    if self.is_eof() {
                        return Err(ParseError::new("Invalid or unexpected token", start));
                    }
                    if self.current() == '*' && self.peek() == '/' {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            return Ok(());
        }
    }

    /// Scan a number literal.
    fn scan_number(&mut self) -> ParseResult<Token> {
        let start = self.pos;

        if self.current() == '0' {
            let radix = match self.peek() {
                'x' | 'X' => Some(16),
                'o' | 'O' => Some(8),
                'b' | 'B' => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                self.advance();
                let digits_start = self.pos;
                while !self.is_eof() && self.current().is_digit(radix) {
                    self.advance();
                }
                let digits: String = self.chars[digits_start..self.pos].iter().collect();
                let value = u64::from_str_radix(&digits, radix)
                    .map_err(|_| self.error("Invalid or unexpected token"))?;
                return self.finish_number(value as f64);
            }
        }

        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
        }

        if self.current() == '.' {
            self.advance();
            while !self.is_eof() && self.current().is_ascii_digit() {
                self.advance();
            }
        }

        if matches!(self.current(), 'e' | 'E') {
            let next = self.peek();
            if next.is_ascii_digit() || next == '+' || next == '-' {
                self.advance();
                if matches!(self.current(), '+' | '-') {
                    self.advance();
                }
                while !self.is_eof() && self.current().is_ascii_digit() {
                    self.advance();
                }
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error("Invalid or unexpected token"))?;
        self.finish_number(value)
    }

    /// Numbers may not run straight into an identifier (`3in`, `1px`).
    fn finish_number(&mut self, value: f64) -> ParseResult<Token> {
        if is_id_start(self.current()) {
            return Err(self.error("Invalid or unexpected token"));
        }
        Ok(self.make_token(TokenKind::Number(value)))
    }

    /// Scan a string literal.
    fn scan_string(&mut self, quote: char) -> ParseResult<Token> {
        self.advance();
        let mut value = String::new();

        while !self.is_eof() && self.current() != quote {
            match self.current() {
                '\\' => {
                    self.advance();
                    self.scan_escape(&mut value)?;
                }
                ch if is_line_terminator(ch) => {
                    return Err(self.error("Invalid or unexpected token"));
                }
                ch => {
                    value.push(ch);
                    self.advance();
                }
            }
        }

        if self.is_eof() {
            return Err(self.error("Invalid or unexpected token"));
        }

        self.advance();
        Ok(self.make_token(TokenKind::String(value)))
    }

    /// Scan template characters up to the closing backtick or the next
    /// `${`. The opening delimiter has already been consumed.
    fn scan_template_chunk(&mut self) -> ParseResult<Token> {
        let mut cooked = String::new();

        loop {
            if self.is_eof() {
                return Err(self.error("Unterminated template literal"));
            }
            match self.current() {
                '`' => {
                    self.advance();
                    return Ok(self.make_token(TokenKind::TemplateString { cooked, tail: true }));
                }
                '$' if self.peek() == '{' => {
                    self.advance();
                    self.advance();
                    self.template_braces.push(0);
                    return Ok(self.make_token(TokenKind::TemplateString { cooked, tail: false }));
                }
                '\\' => {
                    self.advance();
                    self.scan_escape(&mut cooked)?;
                }
                ch => {
                    cooked.push(ch);
                    self.advance();
                }
            }
        }
    }

    /// Decode one escape sequence; the backslash is already consumed.
    fn scan_escape(&mut self, out: &mut String) -> ParseResult<()> {
        let ch = self.current();
        match ch {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_ascii_digit() => out.push('\0'),
            'x' => {
                self.advance();
                let code = self.scan_hex_digits(2)?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                return Ok(());
            }
            'u' => {
                self.advance();
                let code = if self.current() == '{' {
                    self.advance();
                    let mut code: u32 = 0;
                    while !self.is_eof() && self.current() != '}' {
                        let digit = self
                            .current()
                            .to_digit(16)
                            .ok_or_else(|| self.error("Invalid Unicode escape sequence"))?;
                        code = code.saturating_mul(16).saturating_add(digit);
                        self.advance();
                    }
                    self.advance();
                    code
                } else {
                    self.scan_hex_digits(4)?
                };
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                return Ok(());
            }
            '\r' => {
                self.advance();
                if self.current() == '\n' {
                    self.advance();
                }
                return Ok(());
            }
            ch if is_line_terminator(ch) => {}
            ch => out.push(ch),
        }
        self.advance();
        Ok(())
    }

    /// Scan an identifier or keyword.
    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;

        while !self.is_eof() && is_id_continue(self.current()) {
            self.advance();
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Identifier(text));

        self.make_token(kind)
    }

    /// Scan a punctuator.
    fn scan_punctuator(&mut self) -> Token {
        let ch = self.current();
        self.advance();

        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,

            '.' => {
                if self.current() == '.' && self.peek() == '.' {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }

            '?' => {
                if self.eat('?') {
                    if self.eat('=') {
                        TokenKind::QuestionQuestionAssign
                    } else {
                        TokenKind::QuestionQuestion
                    }
                } else if self.current() == '.' && !self.peek().is_ascii_digit() {
                    self.advance();
                    TokenKind::QuestionDot
                } else {
                    TokenKind::Question
                }
            }

            '<' => {
                if self.eat('=') {
                    TokenKind::LessEqual
                } else if self.eat('<') {
                    if self.eat('=') {
                        TokenKind::LeftShiftAssign
                    } else {
                        TokenKind::LeftShift
                    }
                } else {
                    TokenKind::LessThan
                }
            }

            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEqual
                } else if self.eat('>') {
                    if self.eat('>') {
                        if self.eat('=') {
                            TokenKind::UnsignedRightShiftAssign
                        } else {
                            TokenKind::UnsignedRightShift
                        }
                    } else if self.eat('=') {
                        TokenKind::RightShiftAssign
                    } else {
                        TokenKind::RightShift
                    }
                } else {
                    TokenKind::GreaterThan
                }
            }

            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::StrictEqual
                    } else {
                        TokenKind::Equal
                    }
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }

            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::StrictNotEqual
                    } else {
                        TokenKind::NotEqual
                    }
                } else {
                    TokenKind::Bang
                }
            }

            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }

            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }

            '*' => {
                if self.eat('*') {
                    if self.eat('=') {
                        TokenKind::StarStarAssign
                    } else {
                        TokenKind::StarStar
                    }
                } else if self.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }

            '/' => {
                if self.eat('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }

            '%' => {
                if self.eat('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }

            '&' => {
                if self.eat('&') {
                    if self.eat('=') {
                        TokenKind::AmpersandAmpersandAssign
                    } else {
                        TokenKind::AmpersandAmpersand
                    }
                } else if self.eat('=') {
                    TokenKind::AmpersandAssign
                } else {
                    TokenKind::Ampersand
                }
            }

            '|' => {
                if self.eat('|') {
                    if self.eat('=') {
                        TokenKind::PipePipeAssign
                    } else {
                        TokenKind::PipePipe
                    }
                } else if self.eat('=') {
                    TokenKind::PipeAssign
                } else {
                    TokenKind::Pipe
                }
            }

            '^' => {
                if self.eat('=') {
                    TokenKind::CaretAssign
                } else {
                    TokenKind::Caret
                }
            }

            other => TokenKind::Invalid(other),
        };

        self.make_token(kind)
    }

    /// Scan hex digits.
    fn scan_hex_digits(&mut self, count: usize) -> ParseResult<u32> {
        let mut value: u32 = 0;
        for _ in 0..count {
            let digit = self
                .current()
                .to_digit(16)
                .ok_or_else(|| self.error("Invalid hexadecimal escape sequence"))?;
            value = value * 16 + digit;
            self.advance();
        }
        Ok(value)
    }

    // Helper methods

    fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn current(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if let Some(&ch) = self.chars.get(self.pos) {
            self.pos += 1;
            if ch == '\n' || ch == '\u{2028}' || ch == '\u{2029}' {
                self.line += 1;
                self.column = 1;
                self.newline_before = true;
            } else if ch == '\r' {
                if self.current() != '\n' {
                    self.line += 1;
                    self.column = 1;
                }
                self.newline_before = true;
            } else {
                self.column += 1;
            }
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn span_here(&self) -> Span {
        Span::new(self.pos, self.pos + 1, self.line, self.column)
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError::new(
            message,
            Span::new(self.token_start, self.pos, self.token_line, self.token_column),
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            Span::new(self.token_start, self.pos, self.token_line, self.token_column),
            self.token_newline,
        )
    }
}

/// Check if character is whitespace (line terminators included).
fn is_whitespace(ch: char) -> bool {
    matches!(
        ch,
        ' ' | '\t' | '\n' | '\r' | '\x0B' | '\x0C' | '\u{a0}' | '\u{feff}' | '\u{2028}' | '\u{2029}'
    ) || (ch > '\u{7f}' && ch.is_whitespace())
}

fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Check if character can start an identifier.
fn is_id_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

/// Check if character can continue an identifier.
fn is_id_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '\u{200c}' || ch == '\u{200d}'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn columns_are_one_based_and_count_tabs_once() {
        let tokens = Lexer::new("\n\t\tfunction(asdf)").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Function);
        assert_eq!((tokens[0].span.line, tokens[0].span.column), (2, 3));
        assert_eq!(tokens[1].kind, TokenKind::LeftParen);
        assert_eq!(tokens[1].span.column, 11);
        assert!(tokens[0].newline_before);
        assert!(!tokens[1].newline_before);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("42 3.5 .5 0xff 1e3 0b101"),
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.5),
                TokenKind::Number(0.5),
                TokenKind::Number(255.0),
                TokenKind::Number(1000.0),
                TokenKind::Number(5.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"'a\'x<\\>"' "A\x42""#),
            vec![
                TokenKind::String("a'x<\\>\"".into()),
                TokenKind::String("AB".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn non_ascii_identifiers_and_strings() {
        let tokens = Lexer::new("var café = 'ü';").tokenize().unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Identifier("café".into()));
        assert_eq!(tokens[3].kind, TokenKind::String("ü".into()));
        assert_eq!(tokens[3].span.column, 12);
    }

    #[test]
    fn template_with_substitutions() {
        assert_eq!(
            kinds("`a${x + {b:1}.b}c${y}`"),
            vec![
                TokenKind::TemplateString { cooked: "a".into(), tail: false },
                TokenKind::Identifier("x".into()),
                TokenKind::Plus,
                TokenKind::LeftBrace,
                TokenKind::Identifier("b".into()),
                TokenKind::Colon,
                TokenKind::Number(1.0),
                TokenKind::RightBrace,
                TokenKind::Dot,
                TokenKind::Identifier("b".into()),
                TokenKind::TemplateString { cooked: "c".into(), tail: false },
                TokenKind::Identifier("y".into()),
                TokenKind::TemplateString { cooked: "".into(), tail: true },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new("x = 'abc").tokenize().unwrap_err();
        assert_eq!(err.message, "Invalid or unexpected token");
        assert_eq!(err.span.column, 5);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a // line\n/* block */ b"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Identifier("b".into()),
                TokenKind::Eof,
            ]
        );
    }
}
