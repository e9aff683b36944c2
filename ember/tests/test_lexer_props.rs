use ember::lex::{tokenize, TokenKind};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_tokenize_always_terminates(source in "\\PC{0,64}") {
        let (tokens, _) = tokenize(&source);

        let eof_count = tokens.iter().filter(|t| t.kind == TokenKind::EOF).count();
        prop_assert_eq!(eof_count, 1);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::EOF));

        let mut last_index = 0;
        for token in &tokens {
            prop_assert!(token.span.index >= last_index);
            prop_assert!((token.span.index + token.span.size) as usize <= source.len());
            last_index = token.span.index;
        }
    }

    #[test]
    fn test_script_like_input_terminates(
        source in "[a-z0-9 +*/(){};=\"'.\\n-]{0,80}",
    ) {
        let (tokens, _) = tokenize(&source);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::EOF));
    }
}
