//! JavaScript token definitions.

use alloc::string::String;
use core::fmt;

/// Source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start character offset.
    pub start: usize,
    /// End character offset.
    pub end: usize,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }

    /// Merge two spans, keeping the position of `self`.
    pub fn merge(self, other: Span) -> Self {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line,
            column: self.column,
        }
    }
}

/// JavaScript token types.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Number literal (42, 3.14, 0xFF, etc.)
    Number(f64),
    /// String literal ("hello", 'world')
    String(String),
    /// One chunk of a template literal. `tail` is set on the chunk closed by
    /// a backtick; other chunks are followed by a `${` substitution.
    TemplateString { cooked: String, tail: bool },
    /// Boolean true
    True,
    /// Boolean false
    False,
    /// Null literal
    Null,

    /// Identifier (variable name, function name, etc.)
    Identifier(String),

    // Keywords
    Await,
    Break,
    Case,
    Catch,
    Class,
    Const,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Enum,
    Export,
    Extends,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    Instanceof,
    Let,
    New,
    Return,
    Static,
    Super,
    Switch,
    This,
    Throw,
    Try,
    Typeof,
    Var,
    Void,
    While,
    With,
    Yield,

    // Contextual keywords
    Async,
    Of,
    Get,
    Set,

    // Punctuators
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// .
    Dot,
    /// ...
    Ellipsis,
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// <
    LessThan,
    /// >
    GreaterThan,
    /// <=
    LessEqual,
    /// >=
    GreaterEqual,
    /// ==
    Equal,
    /// !=
    NotEqual,
    /// ===
    StrictEqual,
    /// !==
    StrictNotEqual,
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// **
    StarStar,
    /// ++
    PlusPlus,
    /// --
    MinusMinus,
    /// <<
    LeftShift,
    /// >>
    RightShift,
    /// >>>
    UnsignedRightShift,
    /// &
    Ampersand,
    /// |
    Pipe,
    /// ^
    Caret,
    /// !
    Bang,
    /// ~
    Tilde,
    /// &&
    AmpersandAmpersand,
    /// ||
    PipePipe,
    /// ??
    QuestionQuestion,
    /// ?
    Question,
    /// ?.
    QuestionDot,
    /// :
    Colon,
    /// =
    Assign,
    /// +=
    PlusAssign,
    /// -=
    MinusAssign,
    /// *=
    StarAssign,
    /// /=
    SlashAssign,
    /// %=
    PercentAssign,
    /// **=
    StarStarAssign,
    /// <<=
    LeftShiftAssign,
    /// >>=
    RightShiftAssign,
    /// >>>=
    UnsignedRightShiftAssign,
    /// &=
    AmpersandAssign,
    /// |=
    PipeAssign,
    /// ^=
    CaretAssign,
    /// &&=
    AmpersandAmpersandAssign,
    /// ||=
    PipePipeAssign,
    /// ??=
    QuestionQuestionAssign,
    /// =>
    Arrow,

    /// End of file
    Eof,
    /// Invalid token
    Invalid(char),
}

impl TokenKind {
    /// Check if this is an assignment operator.
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::StarAssign
                | TokenKind::SlashAssign
                | TokenKind::PercentAssign
                | TokenKind::StarStarAssign
                | TokenKind::LeftShiftAssign
                | TokenKind::RightShiftAssign
                | TokenKind::UnsignedRightShiftAssign
                | TokenKind::AmpersandAssign
                | TokenKind::PipeAssign
                | TokenKind::CaretAssign
                | TokenKind::AmpersandAmpersandAssign
                | TokenKind::PipePipeAssign
                | TokenKind::QuestionQuestionAssign
        )
    }

    /// Name usable as a binding identifier: plain identifiers plus the
    /// contextual keywords that are only reserved in specific positions.
    pub fn binding_name(&self) -> Option<&str> {
        match self {
            TokenKind::Identifier(name) => Some(name),
            TokenKind::Async => Some("async"),
            TokenKind::Of => Some("of"),
            TokenKind::Get => Some("get"),
            TokenKind::Set => Some("set"),
            TokenKind::Static => Some("static"),
            TokenKind::Let => Some("let"),
            TokenKind::Await => Some("await"),
            TokenKind::Yield => Some("yield"),
            _ => None,
        }
    }

    /// Name usable after `.` or as an object literal key: any identifier or
    /// reserved word.
    pub fn property_name(&self) -> Option<&str> {
        if let Some(name) = self.binding_name() {
            return Some(name);
        }
        match self {
            TokenKind::True => Some("true"),
            TokenKind::False => Some("false"),
            TokenKind::Null => Some("null"),
            _ => self.keyword_text(),
        }
    }

    fn keyword_text(&self) -> Option<&'static str> {
        let text = match self {
            TokenKind::Break => "break",
            TokenKind::Case => "case",
            TokenKind::Catch => "catch",
            TokenKind::Class => "class",
            TokenKind::Const => "const",
            TokenKind::Continue => "continue",
            TokenKind::Debugger => "debugger",
            TokenKind::Default => "default",
            TokenKind::Delete => "delete",
            TokenKind::Do => "do",
            TokenKind::Else => "else",
            TokenKind::Enum => "enum",
            TokenKind::Export => "export",
            TokenKind::Extends => "extends",
            TokenKind::Finally => "finally",
            TokenKind::For => "for",
            TokenKind::Function => "function",
            TokenKind::If => "if",
            TokenKind::Import => "import",
            TokenKind::In => "in",
            TokenKind::Instanceof => "instanceof",
            TokenKind::New => "new",
            TokenKind::Return => "return",
            TokenKind::Super => "super",
            TokenKind::Switch => "switch",
            TokenKind::This => "this",
            TokenKind::Throw => "throw",
            TokenKind::Try => "try",
            TokenKind::Typeof => "typeof",
            TokenKind::Var => "var",
            TokenKind::Void => "void",
            TokenKind::While => "while",
            TokenKind::With => "with",
            _ => return None,
        };
        Some(text)
    }

    /// Get keyword from string.
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "await" => Some(TokenKind::Await),
            "break" => Some(TokenKind::Break),
            "case" => Some(TokenKind::Case),
            "catch" => Some(TokenKind::Catch),
            "class" => Some(TokenKind::Class),
            "const" => Some(TokenKind::Const),
            "continue" => Some(TokenKind::Continue),
            "debugger" => Some(TokenKind::Debugger),
            "default" => Some(TokenKind::Default),
            "delete" => Some(TokenKind::Delete),
            "do" => Some(TokenKind::Do),
            "else" => Some(TokenKind::Else),
            "enum" => Some(TokenKind::Enum),
            "export" => Some(TokenKind::Export),
            "extends" => Some(TokenKind::Extends),
            "finally" => Some(TokenKind::Finally),
            "for" => Some(TokenKind::For),
            "function" => Some(TokenKind::Function),
            "if" => Some(TokenKind::If),
            "import" => Some(TokenKind::Import),
            "in" => Some(TokenKind::In),
            "instanceof" => Some(TokenKind::Instanceof),
            "let" => Some(TokenKind::Let),
            "new" => Some(TokenKind::New),
            "return" => Some(TokenKind::Return),
            "static" => Some(TokenKind::Static),
            "super" => Some(TokenKind::Super),
            "switch" => Some(TokenKind::Switch),
            "this" => Some(TokenKind::This),
            "throw" => Some(TokenKind::Throw),
            "try" => Some(TokenKind::Try),
            "typeof" => Some(TokenKind::Typeof),
            "var" => Some(TokenKind::Var),
            "void" => Some(TokenKind::Void),
            "while" => Some(TokenKind::While),
            "with" => Some(TokenKind::With),
            "yield" => Some(TokenKind::Yield),
            "async" => Some(TokenKind::Async),
            "of" => Some(TokenKind::Of),
            "get" => Some(TokenKind::Get),
            "set" => Some(TokenKind::Set),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "null" => Some(TokenKind::Null),
            _ => None,
        }
    }

    fn punctuator_text(&self) -> Option<&'static str> {
        let text = match self {
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::Dot => ".",
            TokenKind::Ellipsis => "...",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::LessThan => "<",
            TokenKind::GreaterThan => ">",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Equal => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::StrictEqual => "===",
            TokenKind::StrictNotEqual => "!==",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::StarStar => "**",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::LeftShift => "<<",
            TokenKind::RightShift => ">>",
            TokenKind::UnsignedRightShift => ">>>",
            TokenKind::Ampersand => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Bang => "!",
            TokenKind::Tilde => "~",
            TokenKind::AmpersandAmpersand => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::QuestionQuestion => "??",
            TokenKind::Question => "?",
            TokenKind::QuestionDot => "?.",
            TokenKind::Colon => ":",
            TokenKind::Assign => "=",
            TokenKind::PlusAssign => "+=",
            TokenKind::MinusAssign => "-=",
            TokenKind::StarAssign => "*=",
            TokenKind::SlashAssign => "/=",
            TokenKind::PercentAssign => "%=",
            TokenKind::StarStarAssign => "**=",
            TokenKind::LeftShiftAssign => "<<=",
            TokenKind::RightShiftAssign => ">>=",
            TokenKind::UnsignedRightShiftAssign => ">>>=",
            TokenKind::AmpersandAssign => "&=",
            TokenKind::PipeAssign => "|=",
            TokenKind::CaretAssign => "^=",
            TokenKind::AmpersandAmpersandAssign => "&&=",
            TokenKind::PipePipeAssign => "||=",
            TokenKind::QuestionQuestionAssign => "??=",
            TokenKind::Arrow => "=>",
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::TemplateString { .. } => write!(f, "`"),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::Invalid(ch) => write!(f, "{}", ch),
            TokenKind::Eof => write!(f, "end of input"),
            other => match other.punctuator_text().or_else(|| other.property_name()) {
                Some(text) => f.write_str(text),
                None => write!(f, "{:?}", other),
            },
        }
    }
}

/// A token with source location.
#[derive(Debug, Clone)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Source location.
    pub span: Span,
    /// Whether a line terminator precedes this token.
    pub newline_before: bool,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span, newline_before: bool) -> Self {
        Token {
            kind,
            span,
            newline_before,
        }
    }

    /// Check if this is EOF.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contextual_keywords_are_binding_names() {
        assert_eq!(TokenKind::Of.binding_name(), Some("of"));
        assert_eq!(TokenKind::Get.binding_name(), Some("get"));
        assert_eq!(TokenKind::Function.binding_name(), None);
    }

    #[test]
    fn reserved_words_are_property_names() {
        assert_eq!(TokenKind::Delete.property_name(), Some("delete"));
        assert_eq!(TokenKind::Default.property_name(), Some("default"));
        assert_eq!(TokenKind::LeftParen.property_name(), None);
    }

    #[test]
    fn display_uses_source_text() {
        assert_eq!(alloc::format!("{}", TokenKind::LeftParen), "(");
        assert_eq!(alloc::format!("{}", TokenKind::Function), "function");
        assert_eq!(alloc::format!("{}", TokenKind::UnsignedRightShiftAssign), ">>>=");
    }
}
