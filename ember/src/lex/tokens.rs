//! Tokens

use std::{fmt, ops};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub span: Span,
    pub kind: TokenKind,
}

impl Token {
    #[inline]
    pub fn fragment<'a>(&self, text: &'a str) -> &'a str {
        self.span.fragment(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum TokenKind {
    // Simple
    Comma,        // ,
    Dot,          // .
    Ellipsis,     // ...
    Colon,        // :
    Semicolon,    // ;
    Question,     // ?
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]

    // ------------------------------------------------------------------------
    // Operators
    Plus,         // +
    PlusPlus,     // ++
    PlusEq,       // +=
    Minus,        // -
    MinusMinus,   // --
    MinusEq,      // -=
    Star,         // *
    StarEq,       // *=
    Slash,        // /
    SlashEq,      // /=
    Percent,      // %
    PercentEq,    // %=
    Amp,          // &
    AmpAmp,       // &&
    AmpEq,        // &=
    Pipe,         // |
    PipePipe,     // ||
    PipeEq,       // |=
    Caret,        // ^
    CaretEq,      // ^=
    Tilde,        // ~
    Bang,         // !
    BangEq,       // !=
    Eq,           // =
    EqEq,         // ==
    Less,         // <
    LessEq,       // <=
    LessLess,     // <<
    LessLessEq,   // <<=
    Greater,      // >
    GreaterEq,    // >=
    GreaterGreater,   // >>
    GreaterGreaterEq, // >>=

    // ------------------------------------------------------------------------
    // Complex
    Ident,
    /// Reserved identifiers
    Keyword(Keyword),
    /// Integer number literal
    Int,
    /// Floating point number literal
    Float,
    /// String literal, including the quotes
    Str,
    /// Character literal, including the quotes
    Char,

    // ------------------------------------------------------------------------
    // Special
    /// Unsupported character, reported as a lexical error
    Unknown,
    /// End-of-file
    EOF,
}

impl fmt::Display for TokenKind {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TokenKind as T;
        match self {
            T::Comma        => write!(f, "','"),
            T::Dot          => write!(f, "'.'"),
            T::Ellipsis     => write!(f, "'...'"),
            T::Colon        => write!(f, "':'"),
            T::Semicolon    => write!(f, "';'"),
            T::Question     => write!(f, "'?'"),
            T::LeftParen    => write!(f, "'('"),
            T::RightParen   => write!(f, "')'"),
            T::LeftBrace    => write!(f, "'{{'"),
            T::RightBrace   => write!(f, "'}}'"),
            T::LeftBracket  => write!(f, "'['"),
            T::RightBracket => write!(f, "']'"),
            T::Plus         => write!(f, "'+'"),
            T::PlusPlus     => write!(f, "'++'"),
            T::PlusEq       => write!(f, "'+='"),
            T::Minus        => write!(f, "'-'"),
            T::MinusMinus   => write!(f, "'--'"),
            T::MinusEq      => write!(f, "'-='"),
            T::Star         => write!(f, "'*'"),
            T::StarEq       => write!(f, "'*='"),
            T::Slash        => write!(f, "'/'"),
            T::SlashEq      => write!(f, "'/='"),
            T::Percent      => write!(f, "'%'"),
            T::PercentEq    => write!(f, "'%='"),
            T::Amp          => write!(f, "'&'"),
            T::AmpAmp       => write!(f, "'&&'"),
            T::AmpEq        => write!(f, "'&='"),
            T::Pipe         => write!(f, "'|'"),
            T::PipePipe     => write!(f, "'||'"),
            T::PipeEq       => write!(f, "'|='"),
            T::Caret        => write!(f, "'^'"),
            T::CaretEq      => write!(f, "'^='"),
            T::Tilde        => write!(f, "'~'"),
            T::Bang         => write!(f, "'!'"),
            T::BangEq       => write!(f, "'!='"),
            T::Eq           => write!(f, "'='"),
            T::EqEq         => write!(f, "'=='"),
            T::Less         => write!(f, "'<'"),
            T::LessEq       => write!(f, "'<='"),
            T::LessLess     => write!(f, "'<<'"),
            T::LessLessEq   => write!(f, "'<<='"),
            T::Greater      => write!(f, "'>'"),
            T::GreaterEq    => write!(f, "'>='"),
            T::GreaterGreater   => write!(f, "'>>'"),
            T::GreaterGreaterEq => write!(f, "'>>='"),
            T::Ident        => write!(f, "identifier"),
            T::Keyword(kw)  => write!(f, "'{kw}'"),
            T::Int          => write!(f, "integer literal"),
            T::Float        => write!(f, "float literal"),
            T::Str          => write!(f, "string literal"),
            T::Char         => write!(f, "character literal"),
            T::Unknown      => write!(f, "unknown character"),
            T::EOF          => write!(f, "end-of-file"),
        }
    }
}

/// Chunk of source code, encoded as a byte position and size, along with
/// the line and column where it starts.
///
/// Lines and columns are 1-based.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Span {
    pub index: u32,
    pub size: u32,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(index: u32, size: u32) -> Self {
        Self {
            index,
            size,
            line: 1,
            column: 1,
        }
    }

    #[inline]
    pub fn fragment<'a>(&self, text: &'a str) -> &'a str {
        let start = (self.index as usize).min(text.len());
        let end = (self.index as usize + self.size as usize).min(text.len());
        &text[start..end]
    }

    /// Ending index of the span, exclusive.
    #[inline]
    pub fn end(&self) -> u32 {
        self.index + self.size
    }

    pub fn surrounding_line<'a>(&self, text: &'a str) -> (&'a str, Span) {
        const NEWLINE: char = '\n';
        const RETURN: char = '\r';

        let mut chars = text.char_indices().peekable();
        let mut start = 0;
        let mut end = text.len();

        while let Some((i, c)) = chars.next() {
            if i < self.index as usize {
                if c == NEWLINE {
                    // Span not found yet, move the starting cursor to the next line.

                    if chars.peek().map(|(_, c)| *c) == Some(RETURN) {
                        chars.next();
                    }

                    // Line starts at the character after the newline (\n) and carriage return (\r)
                    match chars.peek() {
                        Some((i, _)) => start = *i,
                        None => start = text.len(),
                    }
                }
            } else if c == NEWLINE {
                // End the line when we encounter a newline after the start of the token.
                // Newline tokens (and on Windows the carriage return character)
                // will now be included in the line span.
                end = i + 1;

                if chars.peek().map(|(_, c)| *c) == Some(RETURN) {
                    chars.next();
                    end += 1;
                }

                break;
            }
        }

        let line_span = Span {
            index: start as u32,
            size: end as u32 - start as u32,
            line: self.line,
            column: 1,
        };

        (&text[start..end], line_span)
    }

    /// Combine two spans to produce a new span that
    /// covers both (and everything inbetween).
    ///
    /// ```
    /// use ember::lex::Span;
    ///
    /// let span1 = Span::new(4, 13);
    /// let span2 = Span::new(21, 13);
    /// let span3 = span1.merge(&span2);
    /// assert_eq!(4, span3.index);
    /// assert_eq!(30, span3.size);
    /// ```
    ///
    /// ```text
    /// <-- span1 -->    <-- span2 -->
    /// <---------- span3 ----------->
    /// ```
    pub fn merge(&self, other: &Span) -> Span {
        let first = if self.index <= other.index { self } else { other };
        let index = first.index;
        let size = u32::max(self.end(), other.end()) - index;
        Span {
            index,
            size,
            line: first.line,
            column: first.column,
        }
    }
}

impl ops::Add for Span {
    type Output = Span;

    #[allow(clippy::suspicious_arithmetic_impl)] // subtract needed to merge spans
    fn add(self, rhs: Self) -> Self::Output {
        self.merge(&rhs)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Reserved keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[rustfmt::skip]
pub enum Keyword {
    // ------------------------------------------------------------------------
    // Declarations
    Let,       // let
    Const,     // const
    Fn,        // fn
    Class,     // class
    Enum,      // enum
    Module,    // module
    Struct,    // struct

    // ------------------------------------------------------------------------
    // Control flow
    If,        // if
    Else,      // else
    While,     // while
    Break,     // break
    Continue,  // continue
    Return,    // return

    // ------------------------------------------------------------------------
    // Expressions
    New,       // new
    This,      // this
    Base,      // base
    Ref,       // ref
    Null,      // null
    True,      // true
    False,     // false
}

impl Keyword {
    #[rustfmt::skip]
    pub fn parse(text: impl AsRef<str>) -> Option<Self> {
        match text.as_ref() {
            "let"      => Some(Self::Let),
            "const"    => Some(Self::Const),
            "fn"       => Some(Self::Fn),
            "class"    => Some(Self::Class),
            "enum"     => Some(Self::Enum),
            "module"   => Some(Self::Module),
            "struct"   => Some(Self::Struct),
            // ----------------------------------------------------------------
            "if"       => Some(Self::If),
            "else"     => Some(Self::Else),
            "while"    => Some(Self::While),
            "break"    => Some(Self::Break),
            "continue" => Some(Self::Continue),
            "return"   => Some(Self::Return),
            // ----------------------------------------------------------------
            "new"      => Some(Self::New),
            "this"     => Some(Self::This),
            "base"     => Some(Self::Base),
            "ref"      => Some(Self::Ref),
            "null"     => Some(Self::Null),
            "true"     => Some(Self::True),
            "false"    => Some(Self::False),
            // ----------------------------------------------------------------
            _ => None,
        }
    }

    /// Keywords that start a declaration or statement, used by the parser
    /// to find a place to resume after a syntax error.
    pub fn starts_statement(&self) -> bool {
        use Keyword as K;
        matches!(
            self,
            K::Let | K::Const | K::Fn | K::Class | K::Enum | K::Module
                | K::If | K::While | K::Break | K::Continue | K::Return
        )
    }
}

impl fmt::Display for Keyword {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Let      => write!(f, "let"),
            Self::Const    => write!(f, "const"),
            Self::Fn       => write!(f, "fn"),
            Self::Class    => write!(f, "class"),
            Self::Enum     => write!(f, "enum"),
            Self::Module   => write!(f, "module"),
            Self::Struct   => write!(f, "struct"),
            // ----------------------------------------------------------------
            Self::If       => write!(f, "if"),
            Self::Else     => write!(f, "else"),
            Self::While    => write!(f, "while"),
            Self::Break    => write!(f, "break"),
            Self::Continue => write!(f, "continue"),
            Self::Return   => write!(f, "return"),
            // ----------------------------------------------------------------
            Self::New      => write!(f, "new"),
            Self::This     => write!(f, "this"),
            Self::Base     => write!(f, "base"),
            Self::Ref      => write!(f, "ref"),
            Self::Null     => write!(f, "null"),
            Self::True     => write!(f, "true"),
            Self::False    => write!(f, "false"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_span_fragment() {
        const CODE: &str = "let x = 0xA4;";

        let spans = &[
            Span::new(0, 3), // let
            Span::new(4, 1), // x
            Span::new(6, 1), // =
            Span::new(8, 4), // 0xA4
        ];

        assert_eq!(spans[0].fragment(CODE), "let");
        assert_eq!(spans[1].fragment(CODE), "x");
        assert_eq!(spans[2].fragment(CODE), "=");
        assert_eq!(spans[3].fragment(CODE), "0xA4");
    }

    #[test]
    #[rustfmt::skip]
    fn test_span_surrounding_line() {
        const CODE: &str = "------------\n....here....\n------------";

        let span = Span::new(17, 4);
        assert_eq!(span.fragment(CODE), "here");

        let (line, line_span) = span.surrounding_line(CODE);
        assert_eq!(line, "....here....\n");
        assert_eq!((line_span.index, line_span.size), (13, 13));
    }

    #[test]
    #[rustfmt::skip]
    fn test_span_surrounding_full_text() {
        const CODE: &str = "....here....";

        let span = Span::new(4, 4);
        assert_eq!(span.fragment(CODE), "here");

        let (line, line_span) = span.surrounding_line(CODE);
        assert_eq!(line, "....here....");
        assert_eq!((line_span.index, line_span.size), (0, 12));
    }

    #[test]
    fn test_keyword_roundtrip_display() {
        for text in ["let", "class", "module", "base", "ref", "continue"] {
            let keyword = Keyword::parse(text).unwrap();
            assert_eq!(keyword.to_string(), text);
        }
        assert_eq!(Keyword::parse("i32"), None);
    }
}
