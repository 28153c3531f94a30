use gpuml_gguf::Metadata;

use crate::api::types::Vocabulary;

impl Vocabulary {
    /// Token table from `tokenizer.ggml.*` keys. Missing keys yield an empty table.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let tokens = metadata
            .get_string_array("tokenizer.ggml.tokens")
            .map(|t| t.into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            tokens,
            scores: metadata.get_f32_array("tokenizer.ggml.scores"),
            bos_token_id: metadata.get_u32("tokenizer.ggml.bos_token_id"),
            eos_token_id: metadata.get_u32("tokenizer.ggml.eos_token_id"),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuml_gguf::GGUFValue;
    use std::collections::HashMap;

    #[test]
    fn test_from_metadata() {
        let mut m = HashMap::new();
        m.insert(
            "tokenizer.ggml.tokens".to_string(),
            GGUFValue::Array(vec![
                GGUFValue::String("<s>".into()),
                GGUFValue::String("</s>".into()),
                GGUFValue::String("hi".into()),
            ]),
        );
        m.insert("tokenizer.ggml.bos_token_id".to_string(), GGUFValue::U32(0));
        m.insert("tokenizer.ggml.eos_token_id".to_string(), GGUFValue::U32(1));
        let vocab = Vocabulary::from_metadata(&Metadata::new(m));
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.token(2), Some("hi"));
        assert_eq!(vocab.token(3), None);
        assert_eq!(vocab.bos_token_id, Some(0));
        assert_eq!(vocab.eos_token_id, Some(1));
        assert!(vocab.scores.is_none());
    }

    #[test]
    fn test_empty_without_tokenizer_keys() {
        let vocab = Vocabulary::from_metadata(&Metadata::default());
        assert!(vocab.is_empty());
    }
}
