//! Character scanner.
use std::str::CharIndices;

use itertools::{multipeek, MultiPeek};

/// Null character standing in for the end of the source.
pub const EOF_CHAR: char = '\0';

/// Wrapper for source code that keeps a cursor position,
/// along with the line and column of the current character.
///
/// The `MultiPeek` wrapper allows for arbitrary lookahead by buffering
/// the UTF-8 decoded characters. Peeking advances an internal peek cursor,
/// which is reset whenever the cursor moves or a new peek starts.
pub struct Cursor<'a> {
    original: &'a str,
    chars: MultiPeek<CharIndices<'a>>,
    /// Byte position and character of the current position.
    current: (u32, char),
    line: u32,
    column: u32,
    started: bool,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            original: source,
            chars: multipeek(source.char_indices()),
            current: (0, EOF_CHAR),
            line: 1,
            column: 0,
            started: false,
        }
    }

    /// Advance the cursor and return the new current character.
    pub fn next(&mut self) -> char {
        if self.started && self.current.1 == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.started = true;

        match self.chars.next() {
            Some((index, c)) => self.current = (index as u32, c),
            None => {
                // There is no end-of-file character in the source, so
                // the null byte stands in after the last character.
                self.current = (self.original.len() as u32, EOF_CHAR);
            }
        }

        self.current.1
    }

    #[inline]
    pub fn current(&self) -> char {
        self.current.1
    }

    /// Byte offset of the current character.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.current.0
    }

    /// Character after the current one.
    pub fn peek(&mut self) -> char {
        self.chars.reset_peek();
        self.chars.peek().map(|(_, c)| *c).unwrap_or(EOF_CHAR)
    }

    /// Two characters after the current one.
    pub fn peek2(&mut self) -> char {
        self.chars.reset_peek();
        self.chars.peek();
        self.chars.peek().map(|(_, c)| *c).unwrap_or(EOF_CHAR)
    }

    /// Byte offset of the character after the current one.
    pub fn peek_offset(&mut self) -> u32 {
        self.chars.reset_peek();
        self.chars
            .peek()
            .map(|(i, _)| *i as u32)
            .unwrap_or(self.original.len() as u32)
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[inline]
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Indicates whether the cursor has moved past the last character.
    pub fn at_end(&self) -> bool {
        self.current.0 as usize >= self.original.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_line_and_column() {
        let mut cursor = Cursor::new("ab\ncd");
        assert_eq!(cursor.next(), 'a');
        assert_eq!((cursor.line(), cursor.column()), (1, 1));
        cursor.next(); // b
        assert_eq!(cursor.next(), '\n');
        assert_eq!((cursor.line(), cursor.column()), (1, 3));
        assert_eq!(cursor.next(), 'c');
        assert_eq!((cursor.line(), cursor.column()), (2, 1));
        assert_eq!(cursor.peek(), 'd');
        assert_eq!(cursor.peek2(), EOF_CHAR);
        cursor.next();
        assert_eq!(cursor.next(), EOF_CHAR);
        assert!(cursor.at_end());
    }
}
