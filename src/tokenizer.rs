//! Tokenizador fijo (`cl100k_base`) para contar tokens y recortar solapes.

use anyhow::Result;
use tiktoken_rs::CoreBPE;

pub struct Tokenizer {
    bpe: CoreBPE,
}

impl Tokenizer {
    /// Carga la codificación `cl100k_base` (embebida, sin red).
    pub fn cl100k() -> Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Decodifica los últimos `n` tokens de `text` (o todo el texto si es más corto).
    ///
    /// Si el corte cae dentro de un carácter multibyte, el inicio avanza hasta
    /// el primer token que decodifica a UTF-8 válido.
    pub fn tail(&self, text: &str, n: usize) -> String {
        if n == 0 {
            return String::new();
        }
        let tokens = self.bpe.encode_with_special_tokens(text);
        let start = tokens.len().saturating_sub(n);
        for from in start..tokens.len() {
            if let Ok(decoded) = self.bpe.decode(tokens[from..].to_vec()) {
                return decoded;
            }
        }
        String::new()
    }

    /// Decodifica los primeros `n` tokens de `text`.
    pub fn head(&self, text: &str, n: usize) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        let mut end = n.min(tokens.len());
        while end > 0 {
            if let Ok(decoded) = self.bpe.decode(tokens[..end].to_vec()) {
                return decoded;
            }
            end -= 1;
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_tails() {
        let tok = Tokenizer::cl100k().unwrap();
        let text = "Streaming revenue grew strongly this quarter.";
        let total = tok.count(text);
        assert!(total > 3);
        assert_eq!(tok.tail(text, total + 10), text);
        assert_eq!(tok.tail(text, 0), "");
        assert_eq!(tok.head(text, total), text);

        let tail = tok.tail(text, 2);
        assert!(text.ends_with(&tail));
        assert_eq!(tok.count(&tail), 2);
    }
}
