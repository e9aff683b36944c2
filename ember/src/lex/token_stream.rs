//! Peekable token stream.
use super::{Span, Token, TokenKind};
use crate::{
    constants::MAX_NESTING,
    error::{Diagnostic, DiagnosticKind},
};

/// Buffered stream of tokens that allows arbitrary look ahead.
///
/// The token list is expected to end with a [`TokenKind::EOF`] token,
/// which is returned indefinitely once reached.
pub struct TokenStream<'a> {
    tokens: Vec<Token>,
    pos: usize,
    /// Keep reference to the source so the parser can
    /// slice fragments from it.
    original: &'a str,
    eof: Token,
    /// Current depth of nested productions.
    depth: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: Vec<Token>, original: &'a str) -> Self {
        let end = original.len() as u32;
        let eof = tokens
            .last()
            .filter(|token| token.kind == TokenKind::EOF)
            .cloned()
            .unwrap_or(Token {
                span: Span::new(end, 0),
                kind: TokenKind::EOF,
            });

        Self {
            tokens,
            pos: 0,
            original,
            eof,
            depth: 0,
        }
    }

    pub fn source_code(&self) -> &'a str {
        self.original
    }

    /// Helper function to extract the span's string fragment
    /// from the original source code.
    #[inline]
    pub fn span_fragment(&self, span: &Span) -> &'a str {
        span.fragment(self.original)
    }

    /// The most recently consumed token.
    pub fn previous_token(&self) -> Option<&Token> {
        self.pos.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    /// Enter one level of nesting.
    ///
    /// Fails with a syntax diagnostic at the current token once the
    /// depth passes [`MAX_NESTING`], so that later recursive stages
    /// never see an unbounded tree.
    pub fn enter_nested(&mut self) -> Result<(), Diagnostic> {
        if self.depth >= MAX_NESTING {
            return Err(Diagnostic::error(
                DiagnosticKind::Syntax,
                self.peek().span,
                format!("code is nested too deeply, the limit is {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave_nested(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    /// Forget any nesting left over from an aborted production.
    pub fn reset_nesting(&mut self) {
        self.depth = 0;
    }

    /// Run a production one nesting level deeper.
    pub fn nested<T>(
        &mut self,
        production: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        self.enter_nested()?;
        let result = production(self);
        self.leave_nested(1);
        result
    }

    /// Consumes the current token regardless of type.
    #[inline]
    pub fn next_token(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Consumes the current token if it matches the given token kind.
    ///
    /// Does not consume the token if the types do not match.
    pub fn match_token(&mut self, token_kind: TokenKind) -> bool {
        let is_match = self.peek_kind() == token_kind;
        if is_match {
            self.next_token();
        }
        is_match
    }

    /// Return the current token and advance the cursor.
    ///
    /// The consumed token must match the given token type, otherwise
    /// a syntax diagnostic is returned and the cursor is not advanced.
    pub fn consume(&mut self, token_kind: TokenKind) -> Result<Token, Diagnostic> {
        let token = self.peek();
        if token.kind != token_kind {
            Err(Diagnostic::error(
                DiagnosticKind::Syntax,
                token.span,
                format!("expected {}, found {}", token_kind, token.kind),
            ))
        } else {
            Ok(self.next_token())
        }
    }

    /// Consumes tokens while the given predicate tests as `true`.
    pub fn ignore_while(&mut self, predicate: impl Fn(TokenKind) -> bool) {
        while !self.at_end() && predicate(self.peek_kind()) {
            self.next_token();
        }
    }

    /// Return the current token without advancing the cursor.
    #[inline]
    pub fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    /// Return the token `n` positions after the current one.
    pub fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&self.eof)
    }

    /// Return the current token kind without advancing the cursor.
    #[inline]
    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub fn at_end(&self) -> bool {
        self.peek_kind() == TokenKind::EOF
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lex::tokenize;

    #[test]
    fn test_consume_mismatch_keeps_position() {
        const CODE: &str = "x = 1";
        let (tokens, _) = tokenize(CODE);
        let mut stream = TokenStream::new(tokens, CODE);

        assert!(stream.consume(TokenKind::Int).is_err());
        assert_eq!(stream.consume(TokenKind::Ident).unwrap().fragment(CODE), "x");
        assert!(stream.match_token(TokenKind::Eq));
        assert_eq!(stream.peek_nth(1).kind, TokenKind::EOF);
        stream.next_token();
        stream.next_token();
        assert!(stream.at_end());
        assert_eq!(stream.next_token().kind, TokenKind::EOF);
    }
}
