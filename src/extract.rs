//! Extracción de texto plano a partir de PDFs y ficheros JSON de la SEC.

use std::{fs, path::Path};

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::models::DocumentKind;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("error leyendo {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error extrayendo texto del PDF {path}: {reason}")]
    Pdf { path: String, reason: String },
    #[error("JSON inválido en {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("el documento {path} no contiene texto útil")]
    Empty { path: String },
}

/// Extrae el texto de `path` según su tipo. Un resultado vacío es un error.
pub fn extract_text(path: &Path, kind: DocumentKind) -> Result<String, ExtractError> {
    let text = match kind {
        DocumentKind::Pdf => extract_pdf(path)?,
        DocumentKind::Json => extract_json(path)?,
    };
    if text.trim().is_empty() {
        return Err(ExtractError::Empty {
            path: path.display().to_string(),
        });
    }
    Ok(text)
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    info!("Extrayendo texto del PDF: {}", path.display());
    pdf_extract::extract_text(path).map_err(|e| ExtractError::Pdf {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn extract_json(path: &Path) -> Result<String, ExtractError> {
    info!("Procesando JSON: {}", path.display());
    let raw = fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| ExtractError::Json {
        path: path.display().to_string(),
        source,
    })?;
    Ok(sec_filings_text(&value))
}

fn field<'a>(obj: &'a Value, key: &str) -> &'a str {
    obj.get(key).and_then(Value::as_str).unwrap_or("")
}

fn render_filing(out: &mut String, form: &str, date: &str, description: &str) {
    out.push_str(&format!(
        "Filing Type: {form}\nFiling Date: {date}\nDescription: {description}\n\n"
    ));
}

/// Texto de `filings.recent`, tanto si es una lista de objetos como si sigue
/// el formato columnar de la SEC (arrays paralelos).
pub fn sec_filings_text(value: &Value) -> String {
    let mut text = String::new();
    let Some(recent) = value.get("filings").and_then(|f| f.get("recent")) else {
        return text;
    };

    match recent {
        Value::Array(filings) => {
            for filing in filings {
                render_filing(
                    &mut text,
                    field(filing, "form"),
                    field(filing, "filingDate"),
                    field(filing, "description"),
                );
            }
        }
        Value::Object(_) => {
            let column = |key: &str| -> Vec<&str> {
                recent
                    .get(key)
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().map(|v| v.as_str().unwrap_or("")).collect())
                    .unwrap_or_default()
            };
            let forms = column("form");
            let dates = column("filingDate");
            let mut descriptions = column("primaryDocDescription");
            if descriptions.is_empty() {
                descriptions = column("description");
            }

            for (i, form) in forms.iter().enumerate() {
                render_filing(
                    &mut text,
                    form,
                    dates.get(i).copied().unwrap_or(""),
                    descriptions.get(i).copied().unwrap_or(""),
                );
            }
        }
        _ => {}
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn list_of_filings() {
        let v = json!({"filings": {"recent": [
            {"form": "10-K", "filingDate": "2024-01-26", "description": "Annual report"},
            {"form": "8-K"}
        ]}});
        assert_eq!(
            sec_filings_text(&v),
            "Filing Type: 10-K\nFiling Date: 2024-01-26\nDescription: Annual report\n\n\
             Filing Type: 8-K\nFiling Date: \nDescription: \n\n"
        );
    }

    #[test]
    fn columnar_filings() {
        let v = json!({"cik": "1065280", "filings": {"recent": {
            "form": ["10-Q", "4"],
            "filingDate": ["2024-04-22", "2024-04-01"],
            "primaryDocDescription": ["Quarterly report", ""]
        }}});
        let text = sec_filings_text(&v);
        assert!(text.starts_with("Filing Type: 10-Q\nFiling Date: 2024-04-22\nDescription: Quarterly report\n\n"));
        assert!(text.ends_with("Filing Type: 4\nFiling Date: 2024-04-01\nDescription: \n\n"));
    }

    #[test]
    fn json_without_filings_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.json");
        fs::write(&path, r#"{"name": "Netflix"}"#).unwrap();
        assert!(matches!(
            extract_text(&path, DocumentKind::Json),
            Err(ExtractError::Empty { .. })
        ));
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{oops").unwrap();
        assert!(matches!(
            extract_text(&path, DocumentKind::Json),
            Err(ExtractError::Json { .. })
        ));
    }

    #[test]
    fn unreadable_pdf_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        fs::write(&path, "esto no es un pdf").unwrap();
        assert!(extract_text(&path, DocumentKind::Pdf).is_err());
    }
}
