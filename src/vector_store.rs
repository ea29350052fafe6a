//! Índice vectorial plano (fuerza bruta, distancia L2 al cuadrado) con los
//! metadatos de cada chunk alineados por posición.
//!
//! API pública:
//!   - `VectorIndex::add(metadata, embedding)`
//!   - `VectorIndex::search(query, top_k)`
//!   - `VectorIndex::serialize()` / `VectorIndex::deserialize(bytes)`.
//!
//! Sólo se admite añadir al final o descartar el índice entero; la posición
//! de cada entrada es su único identificador.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::ChunkMetadata;

/// Almacén contiguo de vectores `f32` de dimensión fija.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, vector: &[f32]) {
        self.data.extend_from_slice(vector);
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Distancias L2 al cuadrado de `query` a todas las filas, en orden de posición.
    fn distances(&self, query: &[f32]) -> Vec<(usize, f32)> {
        (0..self.len())
            .map(|pos| {
                let d = self
                    .row(pos)
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (pos, d)
            })
            .collect()
    }

    /// `u32` LE con la dimensión seguido de los `f32` LE de todas las filas.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data.len() * 4);
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(anyhow!("buffer de índice demasiado corto ({} bytes)", bytes.len()));
        }
        let (header, body) = bytes.split_at(4);
        let dimension = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;

        if body.len() % 4 != 0 {
            return Err(anyhow!("longitud de vectores no múltiplo de 4: {}", body.len()));
        }
        let data: Vec<f32> = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        if dimension == 0 && !data.is_empty() {
            return Err(anyhow!("índice con dimensión 0 y datos"));
        }
        if dimension > 0 && data.len() % dimension != 0 {
            return Err(anyhow!(
                "{} valores no encajan en filas de dimensión {}",
                data.len(),
                dimension
            ));
        }
        Ok(Self { dimension, data })
    }
}

/// Resultado de una búsqueda: metadatos del chunk y distancia (menor = más parecido).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Forma persistida: sólo bytes y datos planos, nunca estructuras vivas.
#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    index: Vec<u8>,
    documents: Vec<ChunkMetadata>,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    index: FlatL2Index,
    documents: Vec<ChunkMetadata>,
    last_updated: DateTime<Utc>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            index: FlatL2Index::new(dimension),
            documents: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[ChunkMetadata] {
        &self.documents
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Añade un chunk. Devuelve `false` (y no toca el índice) si el embedding
    /// está vacío o no tiene la dimensión del índice.
    pub fn add(&mut self, metadata: ChunkMetadata, embedding: &[f32]) -> bool {
        if embedding.is_empty() {
            warn!("Embedding vacío para {}; no se añade al índice.", metadata.label());
            return false;
        }
        if embedding.len() != self.index.dimension() {
            warn!(
                "Embedding de dimensión {} para {} (se esperaba {}); no se añade.",
                embedding.len(),
                metadata.label(),
                self.index.dimension()
            );
            return false;
        }

        self.index.push(embedding);
        self.documents.push(metadata);
        self.last_updated = Utc::now();
        true
    }

    /// Hasta `top_k` resultados ordenados por distancia ascendente.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchHit> {
        if self.is_empty() || query.is_empty() || top_k == 0 {
            return Vec::new();
        }
        if query.len() != self.index.dimension() {
            warn!(
                "Consulta de dimensión {} contra un índice de dimensión {}.",
                query.len(),
                self.index.dimension()
            );
            return Vec::new();
        }

        let mut scored = self.index.distances(query);
        // sort_by es estable: los empates conservan el orden de inserción.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(top_k);

        debug!("Búsqueda vectorial: {} resultados de {} entradas.", scored.len(), self.len());
        scored
            .into_iter()
            .map(|(pos, score)| SearchHit {
                metadata: self.documents[pos].clone(),
                score,
            })
            .collect()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let persisted = PersistedIndex {
            index: self.index.to_bytes(),
            documents: self.documents.clone(),
            last_updated: self.last_updated,
        };
        bincode::serialize(&persisted).context("Error serializando el índice vectorial")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let persisted: PersistedIndex =
            bincode::deserialize(bytes).context("Error deserializando el índice vectorial")?;
        let index = FlatL2Index::from_bytes(&persisted.index)?;

        if index.len() != persisted.documents.len() {
            return Err(anyhow!(
                "índice desalineado: {} vectores y {} metadatos",
                index.len(),
                persisted.documents.len()
            ));
        }

        Ok(Self {
            index,
            documents: persisted.documents,
            last_updated: persisted.last_updated,
        })
    }
}
