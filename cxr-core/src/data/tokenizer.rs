use std::{collections::HashMap, fs, path::Path};

use log::info;

use crate::TokenizerError;

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";

const MAX_WORD_CHARS: usize = 100;

/// Fixed-length encoding of one caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    /// Tokens before padding, `[CLS]` and `[SEP]` included.
    pub len: usize,
}

/// Lower-casing WordPiece tokenizer over a BERT `vocab.txt`.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: HashMap<String, i64>,
    max_len: usize,
    cls: i64,
    sep: i64,
    pad: i64,
    unk: i64,
}

impl Tokenizer {
    pub fn from_vocab_file(path: &Path, max_len: usize) -> Result<Self, TokenizerError> {
        let raw = fs::read_to_string(path).map_err(|source| TokenizerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let tokenizer = Self::from_tokens(raw.lines().map(str::to_string), max_len)?;
        info!("Loaded {} word pieces from {}", tokenizer.vocab.len(), path.display());
        Ok(tokenizer)
    }

    /// Token ids are line numbers, as in `vocab.txt`.
    pub fn from_tokens<I: IntoIterator<Item = String>>(tokens: I, max_len: usize) -> Result<Self, TokenizerError> {
        if max_len < 2 {
            return Err(TokenizerError::MaxLength(max_len));
        }
        let vocab: HashMap<String, i64> = tokens
            .into_iter()
            .enumerate()
            .map(|(id, token)| (token.trim_end().to_string(), id as i64))
            .collect();
        let id = |token: &'static str| vocab.get(token).copied().ok_or(TokenizerError::MissingSpecialToken(token));

        Ok(Tokenizer {
            cls: id(CLS_TOKEN)?,
            sep: id(SEP_TOKEN)?,
            pad: id(PAD_TOKEN)?,
            unk: id(UNK_TOKEN)?,
            max_len,
            vocab,
        })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn pad_id(&self) -> i64 {
        self.pad
    }

    pub fn encode(&self, text: &str) -> Encoding {
        let mut input_ids = Vec::with_capacity(self.max_len);
        input_ids.push(self.cls);
        for word in basic_tokens(text) {
            input_ids.extend(self.word_pieces(&word));
        }
        input_ids.truncate(self.max_len - 1);
        input_ids.push(self.sep);

        let len = input_ids.len();
        let mut attention_mask = vec![1; len];
        input_ids.resize(self.max_len, self.pad);
        attention_mask.resize(self.max_len, 0);

        Encoding {
            input_ids,
            attention_mask,
            token_type_ids: vec![0; self.max_len],
            len,
        }
    }

    // greedy longest-match-first
    fn word_pieces(&self, word: &str) -> Vec<i64> {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() > MAX_WORD_CHARS {
            return vec![self.unk];
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut found = None;
            while start < end {
                let mut piece: String = chars[start..end].iter().collect();
                if start > 0 {
                    piece.insert_str(0, "##");
                }
                if let Some(&id) = self.vocab.get(&piece) {
                    found = Some(id);
                    break;
                }
                end -= 1;
            }
            match found {
                Some(id) => pieces.push(id),
                None => return vec![self.unk],
            }
            start = end;
        }
        pieces
    }
}

/// Lower-cases, splits on whitespace and isolates punctuation.
fn basic_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || c.is_control() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if c.is_ascii_punctuation() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn vocab() -> Vec<String> {
        ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "no", "acute", "effusion", "cardio", "##megaly", "."]
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    #[test]
    fn encodes_with_special_tokens_and_padding() {
        let tokenizer = Tokenizer::from_tokens(vocab(), 8).unwrap();
        let encoding = tokenizer.encode("No acute effusion.");
        assert_eq!(encoding.input_ids, vec![2, 4, 5, 6, 9, 3, 0, 0]);
        assert_eq!(encoding.attention_mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
        assert_eq!(encoding.token_type_ids, vec![0; 8]);
        assert_eq!(encoding.len, 6);
    }

    #[test]
    fn splits_word_pieces_and_marks_unknown_words() {
        let tokenizer = Tokenizer::from_tokens(vocab(), 6).unwrap();
        let encoding = tokenizer.encode("cardiomegaly pneumonia");
        assert_eq!(encoding.input_ids, vec![2, 7, 8, 1, 3, 0]);
    }

    #[test]
    fn truncates_long_captions_keeping_sep() {
        let tokenizer = Tokenizer::from_tokens(vocab(), 4).unwrap();
        let encoding = tokenizer.encode("no acute effusion no acute");
        assert_eq!(encoding.input_ids, vec![2, 4, 5, 3]);
        assert_eq!(encoding.len, 4);
    }

    #[test]
    fn empty_caption_is_cls_sep() {
        let tokenizer = Tokenizer::from_tokens(vocab(), 4).unwrap();
        assert_eq!(tokenizer.encode("").input_ids, vec![2, 3, 0, 0]);
    }

    #[test]
    fn vocabulary_needs_special_tokens() {
        let tokens = vec!["[PAD]".to_string(), "[CLS]".to_string()];
        assert!(matches!(
            Tokenizer::from_tokens(tokens, 8),
            Err(TokenizerError::MissingSpecialToken(_))
        ));
        assert!(matches!(Tokenizer::from_tokens(vocab(), 1), Err(TokenizerError::MaxLength(1))));
    }
}
