//! Persistencia de la lista de temas por empresa (`{c}_themes.json`) y
//! generación del informe markdown.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Local;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::{capitalize, themes_path},
    models::{Theme, ThemeCreate},
};

#[derive(Debug, Error)]
pub enum ThemeStoreError {
    #[error("ya existe un tema llamado '{name}' para la empresa '{company_id}'")]
    Duplicate { name: String, company_id: String },
    #[error("no existe el tema '{name}' para la empresa '{company_id}'")]
    NotFound { name: String, company_id: String },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

const THEMES_SUFFIX: &str = "_themes.json";

/// Acceso a los ficheros de temas dentro de `output_dir`.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    output_dir: PathBuf,
}

impl ThemeStore {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn path(&self, company_id: &str) -> PathBuf {
        themes_path(&self.output_dir, company_id)
    }

    /// Carga los temas de una empresa. Fichero ausente o corrupto -> lista vacía.
    pub fn load(&self, company_id: &str) -> Vec<Theme> {
        let path = self.path(company_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("No se pudo leer {}: {e}", path.display());
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<Theme>>(&raw) {
            Ok(mut themes) => {
                for theme in themes.iter_mut().filter(|t| t.company_id.is_empty()) {
                    theme.company_id = company_id.to_string();
                }
                themes
            }
            Err(e) => {
                warn!("Fichero de temas corrupto {}: {e}. Se usa una lista vacía.", path.display());
                Vec::new()
            }
        }
    }

    pub fn save(&self, company_id: &str, themes: &[Theme]) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("No se pudo crear {}", self.output_dir.display()))?;
        let path = self.path(company_id);
        let json = serde_json::to_string_pretty(themes)?;
        fs::write(&path, json).with_context(|| format!("Error guardando {}", path.display()))?;
        info!("Guardados {} temas en {}", themes.len(), path.display());
        Ok(())
    }

    /// Temas de todas las empresas con fichero en `output_dir`.
    pub fn load_all(&self) -> Vec<Theme> {
        let Ok(entries) = fs::read_dir(&self.output_dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| n.strip_suffix(THEMES_SUFFIX))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        ids.iter().flat_map(|id| self.load(id)).collect()
    }

    pub fn get(&self, company_id: &str, name: &str) -> Option<Theme> {
        let wanted = name.to_lowercase();
        self.load(company_id)
            .into_iter()
            .find(|t| t.name.to_lowercase() == wanted)
    }

    /// Añade un tema manual. Con `replace`, un tema con el mismo nombre se sustituye.
    pub fn add_manual(&self, input: ThemeCreate, replace: bool) -> Result<Theme, ThemeStoreError> {
        let company_id = input.company_id.to_lowercase();
        let mut themes = self.load(&company_id);
        let wanted = input.name.to_lowercase();

        if themes.iter().any(|t| t.name.to_lowercase() == wanted) {
            if !replace {
                return Err(ThemeStoreError::Duplicate {
                    name: input.name,
                    company_id,
                });
            }
            themes.retain(|t| t.name.to_lowercase() != wanted);
        }

        let theme = Theme::manual(&input.name, &input.description, &input.category, &company_id);
        themes.push(theme.clone());
        self.save(&company_id, &themes)?;
        info!("Tema manual '{}' añadido para '{}'", theme.name, company_id);
        Ok(theme)
    }

    /// Actualiza nombre, descripción y categoría; conserva evidencia y fuente.
    pub fn update(&self, name: &str, input: ThemeCreate) -> Result<Theme, ThemeStoreError> {
        let company_id = input.company_id.to_lowercase();
        let mut themes = self.load(&company_id);
        let wanted = name.to_lowercase();

        let Some(slot) = themes.iter_mut().find(|t| t.name.to_lowercase() == wanted) else {
            return Err(ThemeStoreError::NotFound {
                name: name.to_string(),
                company_id,
            });
        };
        slot.name = input.name;
        slot.description = input.description;
        slot.category = input.category;
        let updated = slot.clone();

        self.save(&company_id, &themes)?;
        Ok(updated)
    }

    pub fn delete(&self, company_id: &str, name: &str) -> Result<(), ThemeStoreError> {
        let mut themes = self.load(company_id);
        let wanted = name.to_lowercase();
        let Some(pos) = themes.iter().position(|t| t.name.to_lowercase() == wanted) else {
            return Err(ThemeStoreError::NotFound {
                name: name.to_string(),
                company_id: company_id.to_string(),
            });
        };
        themes.remove(pos);
        self.save(company_id, &themes)?;
        Ok(())
    }
}

/// Informe markdown agrupado por categoría (en orden de primera aparición).
pub fn render_markdown(company_id: &str, themes: &[Theme]) -> String {
    let company = capitalize(company_id);
    let mut out = format!("# {company} Business Themes\n\n");
    out.push_str(&format!(
        "*Last updated: {}*\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    let mut categories: Vec<(&str, Vec<&Theme>)> = Vec::new();
    for theme in themes {
        match categories.iter_mut().find(|(c, _)| *c == theme.category) {
            Some((_, group)) => group.push(theme),
            None => categories.push((theme.category.as_str(), vec![theme])),
        }
    }

    for (category, group) in categories {
        out.push_str(&format!("## {category}\n\n"));
        for theme in group {
            out.push_str(&format!("### {}\n\n", theme.name));
            out.push_str(&format!("{}\n\n", theme.description));
            if let Some(evidence) = &theme.evidence {
                out.push_str("**Evidence:**\n\n");
                out.push_str(&format!("{evidence}\n\n"));
            }
            match &theme.source {
                Some(source) => out.push_str(&format!("*Source: {source}*\n\n")),
                None => out.push_str("*Manually added theme*\n\n"),
            }
        }
    }

    out.push_str("---\n");
    out.push_str(&format!(
        "This document was generated automatically by the {company} Theme Extraction Script.\n"
    ));
    out
}

pub fn write_markdown(path: &Path, company_id: &str, themes: &[Theme]) -> anyhow::Result<()> {
    fs::write(path, render_markdown(company_id, themes))
        .with_context(|| format!("Error generando {}", path.display()))?;
    info!("Markdown generado: {}", path.display());
    Ok(())
}
