//! Caché de ingesta direccionada por contenido.
//!
//! Tres artefactos independientes por empresa dentro de `cache_dir`:
//!   - `document_text_cache.json`: ruta → texto extraído
//!   - `file_hashes.json`: ruta → hash del contenido
//!   - `vector_db_cache.bin`: `VectorIndex` serializado
//!
//! Un artefacto ilegible se sustituye por uno vacío (se registra como
//! `CacheCorruption`), lo que fuerza a reingerir los datos afectados.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{error::PipelineError, vector_store::VectorIndex};

pub const TEXT_CACHE_FILE: &str = "document_text_cache.json";
pub const FILE_HASHES_FILE: &str = "file_hashes.json";
pub const INDEX_CACHE_FILE: &str = "vector_db_cache.bin";

/// Hash SHA-256 (hex) de los bytes crudos del fichero.
pub fn file_hash(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("No se pudo leer {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Lee un mapa JSON; si no existe devuelve vacío, si está corrupto avisa y devuelve vacío.
fn read_map<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
        Err(e) => {
            let err = PipelineError::CacheCorruption {
                artifact: path.display().to_string(),
                reason: e.to_string(),
            };
            warn!(kind = err.kind(), "{err}");
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            let err = PipelineError::CacheCorruption {
                artifact: path.display().to_string(),
                reason: e.to_string(),
            };
            warn!(kind = err.kind(), "{err}");
            T::default()
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("No se pudo borrar {}", path.display())),
    }
}

#[derive(Debug)]
pub struct IngestionCache {
    dir: PathBuf,
    text_cache: BTreeMap<String, String>,
    file_hashes: BTreeMap<String, String>,
}

impl IngestionCache {
    /// Abre (y crea si hace falta) la caché de `dir`, cargando texto y hashes.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("No se pudo crear el directorio de caché {}", dir.display()))?;

        let text_cache: BTreeMap<String, String> = read_map(&dir.join(TEXT_CACHE_FILE));
        let file_hashes: BTreeMap<String, String> = read_map(&dir.join(FILE_HASHES_FILE));
        info!(
            "Caché abierta en {}: {} textos y {} hashes.",
            dir.display(),
            text_cache.len(),
            file_hashes.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            text_cache,
            file_hashes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn text_cache_path(&self) -> PathBuf {
        self.dir.join(TEXT_CACHE_FILE)
    }

    pub fn file_hashes_path(&self) -> PathBuf {
        self.dir.join(FILE_HASHES_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_CACHE_FILE)
    }

    pub fn is_empty(&self) -> bool {
        self.text_cache.is_empty() && self.file_hashes.is_empty()
    }

    pub fn recorded_hash(&self, key: &str) -> Option<&str> {
        self.file_hashes.get(key).map(String::as_str)
    }

    /// Texto cacheado sólo si el hash registrado coincide con el actual.
    pub fn cached_text(&self, key: &str, current_hash: &str) -> Option<&str> {
        match self.file_hashes.get(key) {
            Some(h) if h == current_hash => self.text_cache.get(key).map(String::as_str),
            _ => None,
        }
    }

    /// Sobrescribe texto y hash de una ruta.
    pub fn record(&mut self, key: &str, hash: &str, text: &str) {
        self.text_cache.insert(key.to_string(), text.to_string());
        self.file_hashes.insert(key.to_string(), hash.to_string());
    }

    /// Carga el índice serializado, si existe y es válido.
    pub fn load_index(&self) -> Option<VectorIndex> {
        let path = self.index_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                let err = PipelineError::CacheCorruption {
                    artifact: path.display().to_string(),
                    reason: e.to_string(),
                };
                warn!(kind = err.kind(), "{err}");
                return None;
            }
        };
        match VectorIndex::deserialize(&bytes) {
            Ok(index) => Some(index),
            Err(e) => {
                let err = PipelineError::CacheCorruption {
                    artifact: path.display().to_string(),
                    reason: format!("{e:#}"),
                };
                warn!(kind = err.kind(), "{err}");
                None
            }
        }
    }

    /// Persiste los tres artefactos.
    pub fn save(&self, index: &VectorIndex) -> Result<()> {
        fs::write(
            self.text_cache_path(),
            serde_json::to_string(&self.text_cache)?,
        )
        .context("Error guardando la caché de texto")?;
        fs::write(
            self.file_hashes_path(),
            serde_json::to_string_pretty(&self.file_hashes)?,
        )
        .context("Error guardando los hashes de ficheros")?;
        fs::write(self.index_path(), index.serialize()?)
            .context("Error guardando el índice vectorial")?;

        info!(
            "Caché guardada en {} ({} entradas en el índice).",
            self.dir.display(),
            index.len()
        );
        Ok(())
    }

    /// Borra los tres artefactos y vacía el estado en memoria.
    pub fn invalidate(&mut self) -> Result<()> {
        remove_if_exists(&self.text_cache_path())?;
        remove_if_exists(&self.file_hashes_path())?;
        remove_if_exists(&self.index_path())?;
        self.text_cache.clear();
        self.file_hashes.clear();
        info!("Caché invalidada en {}.", self.dir.display());
        Ok(())
    }
}
