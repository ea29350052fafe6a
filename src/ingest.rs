//! Ingesta del directorio de una empresa en el `VectorIndex`:
//! descubrimiento → extracción (o texto cacheado) → troceado → embeddings.
//!
//! Todo es secuencial: un fichero tras otro y un chunk tras otro, con una
//! sola llamada al proveedor de embeddings a la vez.

use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::{
    cache::{file_hash, IngestionCache},
    chunk::TextChunker,
    error::PipelineError,
    extract::extract_text,
    llm::EmbeddingProvider,
    models::{ChunkMetadata, DocumentKind, SourceDocument},
    vector_store::VectorIndex,
};

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_extracted: u32,
    pub files_from_cache: u32,
    pub files_skipped: u32,
    pub chunks_created: usize,
    pub chunks_indexed: usize,
    pub embedding_failures: usize,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} extraídos, {} desde caché, {} omitidos. {} chunks, {} indexados, {} embeddings fallidos.",
            self.files_scanned,
            self.files_extracted,
            self.files_from_cache,
            self.files_skipped,
            self.chunks_created,
            self.chunks_indexed,
            self.embedding_failures
        )
    }
}

/// Recorre `root` y devuelve primero los PDFs y después los JSON, cada grupo
/// ordenado por ruta, con el hash de su contenido actual.
pub fn discover_documents(root: &Path) -> Result<Vec<SourceDocument>> {
    if !root.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", root.display()));
    }

    let mut pdfs = Vec::new();
    let mut jsons = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let Some(kind) = DocumentKind::from_path(path) else {
            continue;
        };
        let content_hash = match file_hash(path) {
            Ok(h) => h,
            Err(e) => {
                warn!("No se pudo calcular el hash de {}: {e:#}. Saltando fichero.", path.display());
                continue;
            }
        };
        let doc = SourceDocument {
            path: path.to_path_buf(),
            kind,
            content_hash,
        };
        match kind {
            DocumentKind::Pdf => pdfs.push(doc),
            DocumentKind::Json => jsons.push(doc),
        }
    }

    pdfs.extend(jsons);
    Ok(pdfs)
}

/// Texto del documento, reutilizando la caché si el hash no ha cambiado.
/// `None` si la extracción falla (el fichero se omite).
fn document_text(
    doc: &SourceDocument,
    cache: &mut IngestionCache,
    summary: &mut IngestionSummary,
) -> Option<String> {
    let key = doc.key();
    if let Some(text) = cache.cached_text(&key, &doc.content_hash) {
        info!("Usando texto cacheado para {}", doc.path.display());
        summary.files_from_cache += 1;
        return Some(text.to_string());
    }

    match extract_text(&doc.path, doc.kind) {
        Ok(text) => {
            cache.record(&key, &doc.content_hash, &text);
            summary.files_extracted += 1;
            Some(text)
        }
        Err(e) => {
            let err = PipelineError::Extraction {
                path: doc.path.display().to_string(),
                reason: e.to_string(),
            };
            warn!(kind = err.kind(), "{err}");
            None
        }
    }
}

/// Ingiere todos los documentos de `root` en `index`.
pub async fn ingest_directory(
    root: &Path,
    cache: &mut IngestionCache,
    chunker: &TextChunker,
    embedder: &dyn EmbeddingProvider,
    index: &mut VectorIndex,
) -> Result<IngestionSummary> {
    let documents = discover_documents(root)?;
    let mut summary = IngestionSummary::default();
    info!("{} documentos encontrados en {}", documents.len(), root.display());

    for doc in &documents {
        summary.files_scanned += 1;

        let Some(text) = document_text(doc, cache, &mut summary) else {
            summary.files_skipped += 1;
            continue;
        };

        let chunks = chunker.chunk(&text);
        if chunks.is_empty() {
            warn!("Fichero sin texto útil tras la limpieza: {}", doc.path.display());
            summary.files_skipped += 1;
            continue;
        }

        let total = chunks.len();
        summary.chunks_created += total;
        let source = doc.file_name();

        for (chunk_id, content) in chunks.into_iter().enumerate() {
            let metadata = ChunkMetadata {
                content,
                source: source.clone(),
                chunk_id,
                total_chunks: total,
                kind: doc.kind,
            };

            let embedding = match embedder.embed(&metadata.content).await {
                Ok(v) => v,
                Err(e) => {
                    let err = PipelineError::Embedding {
                        label: metadata.label(),
                        reason: format!("{e:#}"),
                    };
                    error!(kind = err.kind(), "{err}");
                    Vec::new()
                }
            };

            if index.add(metadata, &embedding) {
                summary.chunks_indexed += 1;
            } else {
                summary.embedding_failures += 1;
            }
        }

        info!("Procesado {} ({} chunks).", doc.path.display(), total);
    }

    Ok(summary)
}
