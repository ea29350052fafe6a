//! Listado de documentos de las empresas seguidas con su estado de procesamiento.

use std::path::Path;

use tracing::warn;

use crate::{
    config::capitalize,
    ingest::discover_documents,
    models::{Company, DocumentInfo},
    pipeline::ProcessedFiles,
};

/// Documentos PDF/JSON bajo `company_dir`; `processed` indica si la ruta
/// figura en el registro de ficheros procesados.
pub fn list_company_documents(
    company_dir: &Path,
    company_id: &str,
    processed: &ProcessedFiles,
) -> Vec<DocumentInfo> {
    if !company_dir.is_dir() {
        return Vec::new();
    }
    match discover_documents(company_dir) {
        Ok(docs) => docs
            .into_iter()
            .map(|doc| {
                let path = doc.key();
                DocumentInfo {
                    company_id: company_id.to_string(),
                    filename: doc.file_name(),
                    processed: processed.contains_key(&path),
                    kind: doc.kind.label().to_string(),
                    hash: Some(doc.content_hash),
                    path,
                }
            })
            .collect(),
        Err(e) => {
            warn!("No se pudo listar {}: {e:#}", company_dir.display());
            Vec::new()
        }
    }
}

/// Documentos de una empresa o, sin `company_id`, de todas las conocidas.
pub fn list_documents(
    tracked_dir: &Path,
    companies: &[Company],
    company_id: Option<&str>,
    processed: &ProcessedFiles,
) -> Vec<DocumentInfo> {
    match company_id {
        Some(id) => {
            let id = id.to_lowercase();
            list_company_documents(&tracked_dir.join(capitalize(&id)), &id, processed)
        }
        None => companies
            .iter()
            .flat_map(|c| list_company_documents(&tracked_dir.join(&c.name), &c.id, processed))
            .collect(),
    }
}
