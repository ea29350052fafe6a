//! Modelos de dominio (temas, documentos, chunks y empresas).

use std::path::{Path, PathBuf};

use mime_guess::MimeGuess;
use serde::{Deserialize, Serialize};

/// Categoría asignada cuando un tema no trae ninguna.
pub const DEFAULT_CATEGORY: &str = "General";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Tema de crecimiento/contracción de negocio de una empresa.
///
/// Un tema sin `source` es un *tema manual*: lo introdujo una persona y la
/// fusión automática nunca lo elimina.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub company_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Theme {
    /// Crea un tema manual (sin `source`).
    pub fn manual(name: &str, description: &str, category: &str, company_id: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            company_id: company_id.to_string(),
            evidence: None,
            source: None,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.source.is_none()
    }
}

/// Datos de entrada para crear o actualizar un tema desde la API.
#[derive(Debug, Clone, Deserialize)]
pub struct ThemeCreate {
    pub name: String,
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub company_id: String,
}

/// Tipo de documento de origen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Json,
}

impl DocumentKind {
    /// Detecta el tipo por MIME (adivinado a partir del nombre) y, si no, por extensión.
    pub fn from_path(path: &Path) -> Option<Self> {
        let mime: MimeGuess = MimeGuess::from_path(path);
        for candidate in mime.iter() {
            match candidate.essence_str() {
                "application/pdf" => return Some(Self::Pdf),
                "application/json" => return Some(Self::Json),
                _ => {}
            }
        }
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Etiqueta en mayúsculas usada en los listados (`PDF`, `JSON`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Json => "JSON",
        }
    }
}

/// Documento descubierto en una pasada de ingesta. Su identidad es la ruta;
/// el hash se recalcula a partir de los bytes en cada pasada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub content_hash: String,
}

impl SourceDocument {
    /// Clave estable para las cachés (`path → ...`).
    pub fn key(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.key())
    }
}

/// Metadatos de un chunk indexado en el `VectorIndex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub content: String,
    pub source: String,
    pub chunk_id: usize,
    pub total_chunks: usize,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
}

impl ChunkMetadata {
    /// `"<fichero> (part i/n)"`, numerado desde 1.
    pub fn label(&self) -> String {
        format!("{} (part {}/{})", self.source, self.chunk_id + 1, self.total_chunks)
    }
}

/// Empresa seguida.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

/// Documento listado por la API, con su estado de procesamiento.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub company_id: String,
    pub filename: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub processed: bool,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    #[serde(default)]
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_without_source_roundtrips_as_manual() {
        let json = r#"{"name":"Ad Tier","description":"d","company_id":"netflix"}"#;
        let theme: Theme = serde_json::from_str(json).unwrap();
        assert!(theme.is_manual());
        assert_eq!(theme.category, DEFAULT_CATEGORY);

        let out = serde_json::to_string(&theme).unwrap();
        assert!(!out.contains("source"));
        assert!(!out.contains("evidence"));
    }

    #[test]
    fn document_kind_from_path() {
        assert_eq!(DocumentKind::from_path(Path::new("a/Q1.PDF")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("sec.json")), Some(DocumentKind::Json));
        assert_eq!(DocumentKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(DocumentKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn chunk_label_is_one_based() {
        let meta = ChunkMetadata {
            content: String::new(),
            source: "q1.pdf".into(),
            chunk_id: 0,
            total_chunks: 3,
            kind: DocumentKind::Pdf,
        };
        assert_eq!(meta.label(), "q1.pdf (part 1/3)");
    }
}
