//! Troceado de texto por tokens con solape.
//!
//! # Algoritmo
//!
//! 1. Limpiar el texto: eliminar caracteres sin valor semántico y colapsar
//!    espacios en blanco.
//! 2. Si el texto completo cabe en `max_tokens`, devolverlo como un único chunk.
//! 3. Partir en frases (`.`, `?` o `!` seguidos de espacio) y empaquetarlas de
//!    forma voraz mientras el chunk en curso no supere `max_tokens`. Una frase
//!    que por sí sola excede el límite se empaqueta palabra a palabra.
//! 4. Segunda pasada: el chunk `i > 0` se prefija con los últimos
//!    `overlap_tokens` tokens del cuerpo del chunk `i - 1`.
//!
//! El límite de tokens se aplica al cuerpo de cada ventana (la parte que no
//! es solape). Una palabra que por sí sola supera el límite queda como su
//! propio chunk.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::tokenizer::Tokenizer;

pub const DEFAULT_MAX_TOKENS: usize = 8192;
pub const DEFAULT_OVERLAP_TOKENS: usize = 200;

fn non_semantic_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[^\w\s.,;:!?()\[\]{}"'\-]"#).expect("regex de limpieza válida")
    })
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("regex de espacios válida"))
}

fn sentence_breaks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("regex de frases válida"))
}

/// Normaliza el texto antes de trocearlo.
pub fn clean_text(text: &str) -> String {
    let stripped = non_semantic_chars().replace_all(text, "");
    whitespace_runs()
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

/// Parte en frases conservando la puntuación final de cada una.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in sentence_breaks().find_iter(text) {
        // La puntuación es ASCII: ocupa un byte.
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn joined(current: &str, next: &str) -> String {
    if current.is_empty() {
        next.to_string()
    } else {
        format!("{current} {next}")
    }
}

/// Una ventana del documento: el solape heredado del chunk anterior más el
/// cuerpo propio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWindow {
    pub overlap: String,
    pub body: String,
}

impl ChunkWindow {
    pub fn text(&self) -> String {
        if self.overlap.is_empty() {
            self.body.clone()
        } else {
            format!("{} {}", self.overlap, self.body)
        }
    }
}

#[derive(Clone)]
pub struct TextChunker {
    tokenizer: Arc<Tokenizer>,
    max_tokens: usize,
    overlap_tokens: usize,
}

impl TextChunker {
    pub fn new(tokenizer: Arc<Tokenizer>, max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            tokenizer,
            max_tokens: max_tokens.max(1),
            overlap_tokens,
        }
    }

    pub fn with_defaults(tokenizer: Arc<Tokenizer>) -> Self {
        Self::new(tokenizer, DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP_TOKENS)
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Trocea `text` en chunks ordenados. Texto vacío -> secuencia vacía.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.windows(text).iter().map(ChunkWindow::text).collect()
    }

    /// Igual que [`chunk`](Self::chunk) pero separando solape y cuerpo.
    pub fn windows(&self, text: &str) -> Vec<ChunkWindow> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let bodies = self.pack(&cleaned);
        let mut windows = Vec::with_capacity(bodies.len());
        for (i, body) in bodies.iter().enumerate() {
            let overlap = if i == 0 {
                String::new()
            } else {
                self.tokenizer.tail(&bodies[i - 1], self.overlap_tokens)
            };
            windows.push(ChunkWindow {
                overlap,
                body: body.clone(),
            });
        }
        windows
    }

    /// Empaquetado voraz por frases, con caída a palabras para frases enormes.
    fn pack(&self, cleaned: &str) -> Vec<String> {
        let fits = |candidate: &str| self.tokenizer.count(candidate) <= self.max_tokens;

        if fits(cleaned) {
            return vec![cleaned.to_string()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in split_sentences(cleaned) {
            let candidate = joined(&current, sentence);
            if fits(&candidate) {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }

            if fits(sentence) {
                current = sentence.to_string();
                continue;
            }

            for word in sentence.split_whitespace() {
                let candidate = joined(&current, word);
                if fits(&candidate) {
                    current = candidate;
                } else {
                    if !current.is_empty() {
                        chunks.push(std::mem::take(&mut current));
                    }
                    current = word.to_string();
                }
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}
