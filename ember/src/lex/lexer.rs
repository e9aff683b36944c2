//! Lexical analysis
use super::{
    cursor::{Cursor, EOF_CHAR},
    tokens::{Keyword, Span, Token, TokenKind},
};
use crate::error::{Diagnostic, DiagnosticKind};

pub struct Lexer<'a> {
    /// Character scanner
    cursor: Cursor<'a>,
    /// Keep reference to the source so the parser can
    /// slice fragments from it.
    original: &'a str,
    /// Start absolute byte position of the current token
    /// in the source.
    start_pos: u32,
    start_line: u32,
    start_column: u32,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(source_code: &'a str) -> Self {
        let mut cursor = Cursor::new(source_code);

        // Initial state of the cursor is a non-existant EOF char,
        // but the initial state of the lexer should be a valid
        // token starting character.
        //
        // Prime the cursor for the first iteration.
        cursor.next();

        let start_pos = cursor.offset();

        Self {
            cursor,
            original: source_code,
            start_pos,
            start_line: 1,
            start_column: 1,
            diagnostics: Vec::new(),
        }
    }

    /// Original source code that was passed in during construction.
    pub fn source_code(&self) -> &'a str {
        self.original
    }

    /// Lexical errors reported so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Scan the source characters and construct the next token.
    ///
    /// ## Implementation
    ///
    /// Each iteration (`next_token` call) starts with the assumption that
    /// the internal cursor is pointing to the start of the remaining source
    /// to be consumed.
    ///
    /// When an iteration is done building a token, it must leave the cursor
    /// at the start of the next token's text. It may not finish leaving the
    /// cursor pointing into its own token.
    pub fn next_token(&mut self) -> Token {
        use TokenKind as TK;

        self.erase_trivia();

        // Assume that lexer initialization, or previous iteration,
        // leaves the cursor at the next character.
        self.start_token();

        match self.cursor.current() {
            ',' => self.make_token(TK::Comma),
            ':' => self.make_token(TK::Colon),
            ';' => self.make_token(TK::Semicolon),
            '?' => self.make_token(TK::Question),
            '(' => self.make_token(TK::LeftParen),
            ')' => self.make_token(TK::RightParen),
            '{' => self.make_token(TK::LeftBrace),
            '}' => self.make_token(TK::RightBrace),
            '[' => self.make_token(TK::LeftBracket),
            ']' => self.make_token(TK::RightBracket),
            '~' => self.make_token(TK::Tilde),
            '.' => {
                if self.cursor.peek() == '.' && self.cursor.peek2() == '.' {
                    self.cursor.next();
                    self.cursor.next();
                    self.make_token(TK::Ellipsis)
                } else {
                    self.make_token(TK::Dot)
                }
            }
            '+' => self.pick2('+', TK::PlusPlus, '=', TK::PlusEq, TK::Plus),
            '-' => self.pick2('-', TK::MinusMinus, '=', TK::MinusEq, TK::Minus),
            '&' => self.pick2('&', TK::AmpAmp, '=', TK::AmpEq, TK::Amp),
            '|' => self.pick2('|', TK::PipePipe, '=', TK::PipeEq, TK::Pipe),
            '*' => self.pick1('=', TK::StarEq, TK::Star),
            '/' => self.pick1('=', TK::SlashEq, TK::Slash),
            '%' => self.pick1('=', TK::PercentEq, TK::Percent),
            '^' => self.pick1('=', TK::CaretEq, TK::Caret),
            '!' => self.pick1('=', TK::BangEq, TK::Bang),
            '=' => self.pick1('=', TK::EqEq, TK::Eq),
            '<' => self.consume_angle('<', TK::Less, TK::LessEq, TK::LessLess, TK::LessLessEq),
            '>' => self.consume_angle(
                '>',
                TK::Greater,
                TK::GreaterEq,
                TK::GreaterGreater,
                TK::GreaterGreaterEq,
            ),
            '"' => self.consume_string(),
            '\'' => self.consume_char(),
            '_' | 'a'..='z' | 'A'..='Z' => self.consume_ident(),
            '0'..='9' => self.consume_number(),

            EOF_CHAR if self.cursor.at_end() => self.make_token(TK::EOF),
            c => {
                let span = self.make_span();
                self.report(span, format!("unexpected character {c:?}"));
                self.make_token(TK::Unknown)
            }
        }
    }

    /// Indicates whether the lexer is at the end of the source.
    ///
    /// Note that source can contain '\0' characters, but not be at the
    /// actual end. It's thus important to verify with this function
    /// whenever a [`TokenKind::EOF`] is encountered.
    pub fn at_end(&self) -> bool {
        self.cursor.at_end()
    }

    /// Create a span using the starting position of the current token,
    /// and the current offset of the cursor.
    fn make_span(&mut self) -> Span {
        let start = self.start_pos;
        let end = self.cursor.peek_offset();

        // start and end can be equal, and a token can have 0 size.
        debug_assert!(end >= start);
        let size = end - start;

        Span {
            index: start,
            size,
            line: self.start_line,
            column: self.start_column,
        }
    }

    /// Span of the cursor's current character only.
    fn current_span(&mut self) -> Span {
        let index = self.cursor.offset();
        Span {
            index,
            size: self.cursor.peek_offset() - index,
            line: self.cursor.line(),
            column: self.cursor.column(),
        }
    }

    fn fragment(&mut self) -> &'a str {
        self.make_span().fragment(self.original)
    }

    /// Primes the lexer to consume the next token.
    fn start_token(&mut self) {
        self.start_pos = self.cursor.offset();
        self.start_line = self.cursor.line();
        self.start_column = self.cursor.column();
    }

    /// Build a token, using the source text from the position
    /// stored by [`start_token`](struct.Lexer.html#fn-start_token) to the
    /// current cursor position.
    ///
    /// Also prepare the cursor for the next iteration.
    fn make_token(&mut self, kind: TokenKind) -> Token {
        let token = Token {
            span: self.make_span(),
            kind,
        };

        // Position the cursor to the starting character for the
        // next token, so the lexer's internal state is primed
        // for the next iteration.
        self.cursor.next();
        debug_assert_eq!(self.cursor.offset(), token.span.end());

        token
    }

    fn report(&mut self, span: Span, message: impl ToString) {
        self.diagnostics
            .push(Diagnostic::error(DiagnosticKind::Lexical, span, message));
    }

    fn pick1(&mut self, second: char, long: TokenKind, short: TokenKind) -> Token {
        if self.cursor.peek() == second {
            self.cursor.next();
            self.make_token(long)
        } else {
            self.make_token(short)
        }
    }

    fn pick2(
        &mut self,
        a: char,
        kind_a: TokenKind,
        b: char,
        kind_b: TokenKind,
        short: TokenKind,
    ) -> Token {
        let peek = self.cursor.peek();
        if peek == a {
            self.cursor.next();
            self.make_token(kind_a)
        } else if peek == b {
            self.cursor.next();
            self.make_token(kind_b)
        } else {
            self.make_token(short)
        }
    }

    /// `<`, `<=`, `<<` and `<<=`, or the mirrored set.
    fn consume_angle(
        &mut self,
        c: char,
        single: TokenKind,
        single_eq: TokenKind,
        double: TokenKind,
        double_eq: TokenKind,
    ) -> Token {
        if self.cursor.peek() == c {
            self.cursor.next();
            self.pick1('=', double_eq, double)
        } else {
            self.pick1('=', single_eq, single)
        }
    }
}

/// Specialised tokens.
impl<'a> Lexer<'a> {
    /// Erase whitespace and comments in front of the next token.
    fn erase_trivia(&mut self) {
        loop {
            while is_whitespace(self.cursor.current()) {
                self.cursor.next();
            }

            match (self.cursor.current(), self.cursor.peek()) {
                ('/', '/') => self.erase_line_comment(),
                ('/', '*') => self.erase_block_comment(),
                _ => return,
            }
        }
    }

    /// Erase comment line up to, but not including, the trailing newline.
    fn erase_line_comment(&mut self) {
        while !is_newline(self.cursor.current()) && !self.cursor.at_end() {
            self.cursor.next();
        }
    }

    fn erase_block_comment(&mut self) {
        let start = self.current_span();
        self.cursor.next(); // '/'
        self.cursor.next(); // '*'

        loop {
            if self.cursor.at_end() {
                self.report(start, "unterminated block comment");
                return;
            }
            if self.cursor.current() == '*' && self.cursor.peek() == '/' {
                self.cursor.next();
                self.cursor.next();
                return;
            }
            self.cursor.next();
        }
    }

    /// Make an identifier token.
    fn consume_ident(&mut self) -> Token {
        debug_assert!(is_letter(self.cursor.current()));

        while is_letter_or_digit(self.cursor.peek()) {
            self.cursor.next();
        }

        let token_kind = match Keyword::parse(self.fragment()) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident,
        };

        self.make_token(token_kind)
    }

    /// Make a number literal token.
    fn consume_number(&mut self) -> Token {
        debug_assert!(is_digit(self.cursor.current()));

        // Number format marker located in second position.
        if self.cursor.current() == '0' && matches!(self.cursor.peek(), 'b' | 'x') {
            let marker = self.cursor.next();
            let valid: fn(char) -> bool = if marker == 'x' {
                is_hex_number
            } else {
                is_binary_digit
            };

            if !valid(self.cursor.peek()) {
                let span = self.make_span();
                self.report(span, "number literal has no digits");
            }
            while valid(self.cursor.peek()) {
                self.cursor.next();
            }

            return self.make_token(TokenKind::Int);
        }

        while is_digit(self.cursor.peek()) {
            self.cursor.next();
        }

        let mut kind = TokenKind::Int;

        if self.cursor.peek() == '.' && is_digit(self.cursor.peek2()) {
            kind = TokenKind::Float;
            self.cursor.next(); // '.'
            while is_digit(self.cursor.peek()) {
                self.cursor.next();
            }
        }

        if matches!(self.cursor.peek(), 'e' | 'E')
            && (is_digit(self.cursor.peek2()) || matches!(self.cursor.peek2(), '+' | '-'))
        {
            kind = TokenKind::Float;
            self.cursor.next(); // 'e'
            if matches!(self.cursor.peek(), '+' | '-') {
                self.cursor.next();
            }
            if !is_digit(self.cursor.peek()) {
                let span = self.make_span();
                self.report(span, "exponent has no digits");
            }
            while is_digit(self.cursor.peek()) {
                self.cursor.next();
            }
        }

        self.make_token(kind)
    }

    fn consume_string(&mut self) -> Token {
        debug_assert_eq!(self.cursor.current(), '"');

        loop {
            let c = self.cursor.next();
            if self.cursor.at_end() {
                let span = self.make_span();
                self.report(span, "unterminated string literal");
                return self.make_token(TokenKind::Unknown);
            }
            match c {
                '"' => return self.make_token(TokenKind::Str),
                '\\' => self.consume_escape(),
                _ => {}
            }
        }
    }

    fn consume_char(&mut self) -> Token {
        debug_assert_eq!(self.cursor.current(), '\'');

        let c = self.cursor.next();
        if c == '\\' {
            self.consume_escape();
        } else if c == '\'' || is_newline(c) || self.cursor.at_end() {
            let span = self.make_span();
            self.report(span, "empty or unterminated character literal");
            return self.make_token(TokenKind::Unknown);
        }

        if self.cursor.peek() == '\'' {
            self.cursor.next();
            self.make_token(TokenKind::Char)
        } else {
            let span = self.make_span();
            self.report(span, "character literal must contain exactly one character");
            self.make_token(TokenKind::Unknown)
        }
    }

    /// Validate the character following a backslash.
    fn consume_escape(&mut self) {
        debug_assert_eq!(self.cursor.current(), '\\');
        let span = self.current_span();
        let c = self.cursor.next();
        if !self.cursor.at_end() && escape_char(c).is_none() {
            self.report(span, format!("unknown escape sequence '\\{c}'"));
        }
    }
}

/// Character denoted by the escape sequence `\c`.
pub fn escape_char(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' => Some('\0'),
        '\\' => Some('\\'),
        '"' => Some('"'),
        '\'' => Some('\''),
        _ => None,
    }
}

/// Contents of a quoted string or character literal, with escape
/// sequences replaced.
pub fn unescape(literal: &str) -> String {
    let inner = literal
        .get(1..literal.len().saturating_sub(1))
        .unwrap_or_default();

    let mut buf = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(e) => buf.push(escape_char(e).unwrap_or(e)),
                None => buf.push('\\'),
            }
        } else {
            buf.push(c);
        }
    }
    buf
}

/// Lex the whole source.
///
/// Unknown characters and malformed literals are dropped from the
/// token list and reported as diagnostics instead. The list always
/// ends with a single [`TokenKind::EOF`].
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = lexer.next_token();
        match token.kind {
            TokenKind::Unknown => continue,
            TokenKind::EOF if lexer.at_end() => {
                tokens.push(token);
                break;
            }
            _ => tokens.push(token),
        }
    }

    (tokens, lexer.take_diagnostics())
}

/// Test whether the character is considered whitespace
/// that should be ignored by the parser later.
fn is_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0020}' // space
            | '\u{0009}' // tab
            | '\u{000A}' // line feed
            | '\u{000D}' // carriage return
            | '\u{00A0}' // no-break space
            | '\u{FEFF}' // zero width no-break space
    )
}

fn is_newline(c: char) -> bool {
    matches!(c, '\r' | '\n')
}

fn is_hex_number(c: char) -> bool {
    is_digit(c) || is_hex_letter(c)
}

fn is_binary_digit(c: char) -> bool {
    matches!(c, '0' | '1')
}

#[allow(clippy::manual_is_ascii_check)] // consistency with other functions
fn is_digit(c: char) -> bool {
    matches!(c, '0'..='9')
}

fn is_hex_letter(c: char) -> bool {
    matches!(c, 'a'..='f' | 'A'..='F')
}

fn is_letter(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '_')
}

fn is_letter_or_digit(c: char) -> bool {
    is_letter(c) || is_digit(c)
}

impl<'a> IntoIterator for Lexer<'a> {
    type Item = Token;
    type IntoIter = LexerIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        LexerIter {
            lexer: self,
            done: false,
        }
    }
}

/// Convenience iterator that wraps the lexer.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct LexerIter<'a> {
    // Track end so an EOF token is emitted once.
    done: bool,
    lexer: Lexer<'a>,
}

impl<'a> Iterator for LexerIter<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.lexer.at_end() {
            if self.done {
                None
            } else {
                // Emit that last EOF token
                self.done = true;
                Some(self.lexer.next_token())
            }
        } else {
            Some(self.lexer.next_token())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use TokenKind as T;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = tokenize(source);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            kinds("1 + 2 * 3;"),
            vec![T::Int, T::Plus, T::Int, T::Star, T::Int, T::Semicolon, T::EOF]
        );
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            kinds("a <<= b >> c != d ... ++e"),
            vec![
                T::Ident,
                T::LessLessEq,
                T::Ident,
                T::GreaterGreater,
                T::Ident,
                T::BangEq,
                T::Ident,
                T::Ellipsis,
                T::PlusPlus,
                T::Ident,
                T::EOF
            ]
        );
    }

    #[test]
    fn test_numbers() {
        const CODE: &str = "0x7f 0b101 12 1.5 2e3 3.x";
        let (tokens, _) = tokenize(CODE);
        let pairs: Vec<(TokenKind, &str)> = tokens
            .iter()
            .map(|t| (t.kind, t.fragment(CODE)))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (T::Int, "0x7f"),
                (T::Int, "0b101"),
                (T::Int, "12"),
                (T::Float, "1.5"),
                (T::Float, "2e3"),
                (T::Int, "3"),
                (T::Dot, "."),
                (T::Ident, "x"),
                (T::EOF, ""),
            ]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        const CODE: &str = "// header\nlet /* inline */ x = 'a';\n";
        let (tokens, diagnostics) = tokenize(CODE);
        assert!(diagnostics.is_empty());

        assert_eq!(tokens[0].kind, T::Keyword(Keyword::Let));
        assert_eq!((tokens[0].span.line, tokens[0].span.column), (2, 1));
        assert_eq!(tokens[1].fragment(CODE), "x");
        assert_eq!((tokens[1].span.line, tokens[1].span.column), (2, 18));
        assert_eq!(tokens[3].kind, T::Char);
        assert_eq!(tokens[3].fragment(CODE), "'a'");
    }

    #[test]
    fn test_string_escapes() {
        const CODE: &str = r#""a\tb\"c""#;
        let (tokens, diagnostics) = tokenize(CODE);
        assert!(diagnostics.is_empty());
        assert_eq!(tokens[0].kind, T::Str);
        assert_eq!(unescape(tokens[0].fragment(CODE)), "a\tb\"c");
    }

    #[test]
    fn test_errors_continue_scanning() {
        let (tokens, diagnostics) = tokenize("let $ = @;\n\"open");
        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::Lexical));
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![T::Keyword(Keyword::Let), T::Eq, T::Semicolon, T::EOF]
        );
    }

    #[test]
    fn test_unterminated_block_comment() {
        let (tokens, diagnostics) = tokenize("1 /* never closed");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "unterminated block comment");
        assert_eq!(tokens.last().map(|t| t.kind), Some(T::EOF));
    }
}
