//! Lexical analysis and token stream.
mod cursor;
mod lexer;
mod token_stream;
mod tokens;

pub use self::{
    lexer::{escape_char, tokenize, unescape, Lexer, LexerIter},
    token_stream::TokenStream,
    tokens::{Keyword, Span, Token, TokenKind},
};
