use super::token::{ByteClass, Token, classify};

/// Longest letter run collected for dictionary lookup.
const MAX_WORD: usize = 4;

/// Convert a byte slice into a sequence of coarse tokens.
///
/// Bytes are grouped into runs of the same character class. Digit and letter
/// runs are run-length encoded (`D1..D10`, `C1..C10`); punctuation and
/// whitespace runs collapse to a single class token. Letter runs of one to
/// four characters are looked up (uppercased) in the timestamp dictionary
/// first, so `Mar`, `Mon`, `PM`, `UTC`, `T` and `Z` come out as semantic
/// tokens rather than `Cn`.
pub(crate) fn tokenize(input: &[u8]) -> Vec<Token> {
    if input.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::with_capacity(input.len() / 4 + 8);
    let mut word = [0u8; MAX_WORD];
    let mut word_len = 0usize;

    let mut run_class = classify(input[0]);
    let mut run_len = 1usize;
    if run_class == ByteClass::Letter {
        word[0] = input[0].to_ascii_uppercase();
        word_len = 1;
    }

    for &b in &input[1..] {
        let class = classify(b);
        if class != run_class {
            emit(&mut tokens, run_class, run_len, &word[..word_len]);
            run_class = class;
            run_len = 0;
            word_len = 0;
        }
        run_len += 1;
        if class == ByteClass::Letter && word_len < MAX_WORD {
            word[word_len] = b.to_ascii_uppercase();
            word_len += 1;
        }
    }
    emit(&mut tokens, run_class, run_len, &word[..word_len]);

    tokens
}

fn emit(tokens: &mut Vec<Token>, class: ByteClass, run_len: usize, word: &[u8]) {
    let token = match class {
        ByteClass::Space => Token::SPACE,
        ByteClass::Digit => Token::digit_run(run_len),
        ByteClass::Punct(t) => t,
        ByteClass::Letter => {
            if run_len <= MAX_WORD {
                if let Some(special) = dictionary_lookup(word) {
                    tokens.push(special);
                    return;
                }
            }
            Token::letter_run(run_len)
        }
    };
    tokens.push(token);
}

/// Dictionary of short words that carry timestamp meaning. Input is already
/// uppercased.
fn dictionary_lookup(word: &[u8]) -> Option<Token> {
    match word {
        b"T" => Some(Token::T),
        b"Z" => Some(Token::ZONE),
        b"AM" | b"PM" => Some(Token::APM),
        b"JAN" | b"FEB" | b"MAR" | b"APR" | b"MAY" | b"JUN" | b"JUL" | b"AUG" | b"SEP"
        | b"OCT" | b"NOV" | b"DEC" => Some(Token::MONTH),
        b"MON" | b"TUE" | b"WED" | b"THU" | b"FRI" | b"SAT" | b"SUN" => Some(Token::DAY),
        b"UTC" | b"GMT" | b"EST" | b"EDT" | b"CST" | b"CDT" | b"MST" | b"MDT" | b"PST"
        | b"PDT" | b"JST" | b"KST" | b"IST" | b"MSK" | b"CET" | b"BST" | b"HST" | b"HDT"
        | b"NST" | b"NDT" => Some(Token::ZONE),
        b"CEST" | b"NZST" | b"NZDT" | b"ACST" | b"ACDT" | b"AEST" | b"AEDT" | b"AWST"
        | b"AWDT" | b"AKST" | b"AKDT" | b"CHST" | b"CHDT" => Some(Token::ZONE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize(b"").is_empty());
    }

    #[test]
    fn basic_timestamp_tokenizes() {
        // 2024-03-28 13:45:30 → D4 - D2 - D2 SPACE D2 : D2 : D2
        let tokens = tokenize(b"2024-03-28 13:45:30");
        let expected = vec![
            Token::digit_run(4),
            Token::DASH,
            Token::digit_run(2),
            Token::DASH,
            Token::digit_run(2),
            Token::SPACE,
            Token::digit_run(2),
            Token::COLON,
            Token::digit_run(2),
            Token::COLON,
            Token::digit_run(2),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn digit_runs_encode_length() {
        assert_eq!(tokenize(b"1"), vec![Token::digit_run(1)]);
        assert_eq!(tokenize(b"12"), vec![Token::digit_run(2)]);
        assert_eq!(tokenize(b"123"), vec![Token::digit_run(3)]);
        assert_eq!(tokenize(b"1234"), vec![Token::digit_run(4)]);
    }

    #[test]
    fn long_runs_are_capped_at_ten() {
        assert_eq!(tokenize(b"123456789012345"), vec![Token::digit_run(10)]);
        assert_eq!(tokenize(b"abcdefghijklmno"), vec![Token::letter_run(10)]);
    }

    #[test]
    fn dictionary_words_become_semantic_tokens() {
        let cases: &[(&[u8], Token)] = &[
            (b"T", Token::T),
            (b"Z", Token::ZONE),
            (b"AM", Token::APM),
            (b"PM", Token::APM),
            (b"Jan", Token::MONTH),
            (b"Mon", Token::DAY),
            (b"UTC", Token::ZONE),
            (b"PST", Token::ZONE),
            (b"CEST", Token::ZONE),
        ];
        for (input, want) in cases {
            let tokens = tokenize(input);
            assert!(
                tokens.contains(want),
                "tokenize({:?}) = {tokens:?}, expected {want:?}",
                std::str::from_utf8(input).unwrap()
            );
        }
    }

    #[test]
    fn month_inside_syslog_timestamp() {
        // Mar 16 08:12:04
        let tokens = tokenize(b"Mar 16 08:12:04");
        assert_eq!(tokens[0], Token::MONTH);
    }

    #[test]
    fn lowercase_words_match_dictionary() {
        assert!(tokenize(b"jan").contains(&Token::MONTH));
        assert!(tokenize(b"z").contains(&Token::ZONE));
    }

    #[test]
    fn five_letter_words_are_plain_runs() {
        assert_eq!(tokenize(b"ERROR"), vec![Token::letter_run(5)]);
    }
}
