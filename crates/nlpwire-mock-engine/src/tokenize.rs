//! Whitespace tokenizer with trailing-punctuation splitting.
//!
//! Offsets are character offsets into the document, end exclusive.

use serde_json::{json, Value};

const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];
const SENTENCE_FINAL: &[&str] = &[".", "!", "?"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word: Vec<char> = Vec::new();
    let mut word_start = 0;

    for (idx, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            flush_word(&mut word, word_start, &mut tokens);
        } else {
            if word.is_empty() {
                word_start = idx;
            }
            word.push(ch);
        }
    }
    flush_word(&mut word, word_start, &mut tokens);
    tokens
}

fn flush_word(word: &mut Vec<char>, start: usize, tokens: &mut Vec<Token>) {
    if word.is_empty() {
        return;
    }
    let mut core_len = word.len();
    while core_len > 0 && TRAILING_PUNCTUATION.contains(&word[core_len - 1]) {
        core_len -= 1;
    }
    if core_len > 0 {
        tokens.push(Token {
            text: word[..core_len].iter().collect(),
            start,
            end: start + core_len,
        });
    }
    for (offset, ch) in word[core_len..].iter().enumerate() {
        let pos = start + core_len + offset;
        tokens.push(Token {
            text: ch.to_string(),
            start: pos,
            end: pos + 1,
        });
    }
    word.clear();
}

/// Group tokens into sentences ending at `.`, `!` or `?`.
pub fn split_sentences(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        let ends = SENTENCE_FINAL.contains(&token.text.as_str());
        current.push(token);
        if ends {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

/// The document annotation returned for `PARSEDOC`.
pub fn annotate(text: &str) -> Value {
    let sentences: Vec<Value> = split_sentences(tokenize(text))
        .into_iter()
        .map(|sentence| {
            let tokens: Vec<&str> = sentence.iter().map(|t| t.text.as_str()).collect();
            let offsets: Vec<[usize; 2]> = sentence.iter().map(|t| [t.start, t.end]).collect();
            json!({ "tokens": tokens, "char_offsets": offsets })
        })
        .collect();
    json!({ "sentences": sentences })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn splits_trailing_punctuation() {
        let tokens = tokenize("Hello world.");
        assert_eq!(texts(&tokens), ["Hello", "world", "."]);
        assert_eq!((tokens[2].start, tokens[2].end), (11, 12));
    }

    #[test]
    fn offsets_count_characters() {
        let tokens = tokenize("  héllo  wörld");
        assert_eq!((tokens[0].start, tokens[0].end), (2, 7));
        assert_eq!((tokens[1].start, tokens[1].end), (9, 14));
    }

    #[test]
    fn sentences_break_on_final_punctuation() {
        let sentences = split_sentences(tokenize("Hi there! How are you? Fine"));
        assert_eq!(sentences.len(), 3);
        assert_eq!(texts(&sentences[0]), ["Hi", "there", "!"]);
        assert_eq!(texts(&sentences[2]), ["Fine"]);
    }

    #[test]
    fn annotate_shape() {
        let value = annotate("Hello world.");
        assert_eq!(
            value,
            json!({"sentences": [{
                "tokens": ["Hello", "world", "."],
                "char_offsets": [[0, 5], [6, 11], [11, 12]]
            }]})
        );
        assert_eq!(annotate("   "), json!({"sentences": []}));
    }
}
