//! Carga y gestión de configuración de la aplicación (proveedor LLM + rutas por empresa).
//!
//! `AppConfig` se lee del entorno una sola vez; `RunConfig` describe una
//! ejecución concreta para una empresa y se pasa explícitamente a cada
//! componente (no hay nombres de fichero globales mutables).

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::chunk::{DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP_TOKENS};

/// Modelo de chat usado por defecto.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
/// Modelo de embeddings usado por defecto.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
/// Dimensión de `text-embedding-3-large`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 3072;

pub const PROCESSED_FILES_JSON: &str = "processed_files.json";
pub const COMPANIES_JSON: &str = "companies.json";

/// Configuración global de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub llm_chat_model: String,
    pub llm_embedding_model: String,
    pub embedding_dimensions: usize,
    pub data_dir: PathBuf,
    pub server_addr: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let openai_api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());

        let embedding_dimensions = match env::var("EMBEDDING_DIMENSIONS") {
            Ok(raw) => raw
                .parse::<usize>()
                .map_err(|_| anyhow!("EMBEDDING_DIMENSIONS no es un entero válido: {raw}"))?,
            Err(_) => DEFAULT_EMBEDDING_DIMENSIONS,
        };
        if embedding_dimensions == 0 {
            return Err(anyhow!("EMBEDDING_DIMENSIONS debe ser > 0"));
        }

        let data_dir = env::var("FILINGS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("filingsdata"));

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());

        Ok(Self {
            openai_api_key,
            llm_chat_model,
            llm_embedding_model,
            embedding_dimensions,
            data_dir,
            server_addr,
        })
    }

    /// Directorio de salida por defecto (`{data}/output`).
    pub fn default_output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    /// Directorio raíz con una carpeta por empresa seguida.
    pub fn tracked_companies_dir(&self) -> PathBuf {
        self.data_dir.join("trackedcompanies")
    }

    pub fn companies_file(&self) -> PathBuf {
        self.data_dir.join(COMPANIES_JSON)
    }

    /// Construye la configuración de ejecución por defecto para una empresa.
    pub fn run_for(&self, company_id: &str) -> RunConfig {
        let output_dir = self.default_output_dir();
        RunConfig::new(
            company_id,
            self.tracked_companies_dir().join(capitalize(company_id)),
            output_dir,
            None,
        )
    }
}

/// Parámetros del troceado de texto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap_tokens: DEFAULT_OVERLAP_TOKENS,
        }
    }
}

/// Configuración explícita de una ejecución para una empresa.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub company_id: String,
    pub company_name: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub chunking: ChunkingConfig,
}

impl RunConfig {
    /// `cache_dir` por defecto: `{output}/cache/{company_id}`.
    pub fn new(
        company_id: &str,
        input_dir: PathBuf,
        output_dir: PathBuf,
        cache_dir: Option<PathBuf>,
    ) -> Self {
        let company_id = company_id.trim().to_lowercase();
        let cache_dir =
            cache_dir.unwrap_or_else(|| output_dir.join("cache").join(&company_id));
        Self {
            company_name: capitalize(&company_id),
            company_id,
            input_dir,
            output_dir,
            cache_dir,
            chunking: ChunkingConfig::default(),
        }
    }

    pub fn themes_file(&self) -> PathBuf {
        self.output_dir.join(themes_file_name(&self.company_id))
    }

    pub fn themes_markdown_file(&self) -> PathBuf {
        self.output_dir.join(format!("{}_themes.md", self.company_id))
    }

    pub fn processed_files_path(&self) -> PathBuf {
        self.output_dir.join(PROCESSED_FILES_JSON)
    }
}

/// Nombre del fichero de temas de una empresa (`{c}_themes.json`).
pub fn themes_file_name(company_id: &str) -> String {
    format!("{}_themes.json", company_id)
}

/// Ruta al fichero de temas dentro de `output_dir`.
pub fn themes_path(output_dir: &Path, company_id: &str) -> PathBuf {
    output_dir.join(themes_file_name(company_id))
}

/// Un id de empresa forma parte de rutas (`{c}_themes.json`, `cache/{c}`):
/// sólo se aceptan letras/dígitos ASCII, `-` y `_`.
pub fn is_valid_company_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `"netflix"` -> `"Netflix"`.
pub fn capitalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
