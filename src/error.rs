//! Taxonomía explícita de fallos "blandos" del pipeline.
//!
//! Ninguno de estos errores aborta un lote: cada uno termina su unidad de
//! trabajo (un fichero, un chunk o una pregunta), se registra en el log y el
//! llamador continúa con un valor vacío. No hay reintentos.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// El PDF/JSON no produjo texto; el fichero se omite.
    #[error("no se pudo extraer texto de {path}: {reason}")]
    Extraction { path: String, reason: String },

    /// El proveedor no devolvió vector; el chunk no entra en el índice.
    #[error("no se pudo generar el embedding de {label}: {reason}")]
    Embedding { label: String, reason: String },

    /// Un artefacto de caché no se pudo leer o deserializar; se usa uno vacío.
    #[error("caché corrupta en {artifact}: {reason}")]
    CacheCorruption { artifact: String, reason: String },

    /// No se pudo persistir un artefacto de caché; el índice en memoria sigue en uso.
    #[error("no se pudo escribir la caché en {artifact}: {reason}")]
    CacheWrite { artifact: String, reason: String },

    /// La llamada de completado falló o devolvió una respuesta inválida.
    #[error("fallo del proveedor de completado ({context}): {reason}")]
    Completion { context: String, reason: String },
}

impl PipelineError {
    /// Etiqueta estable para el campo `kind` de los logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction",
            Self::Embedding { .. } => "embedding",
            Self::CacheCorruption { .. } => "cache_corruption",
            Self::CacheWrite { .. } => "cache_write",
            Self::Completion { .. } => "completion",
        }
    }
}
