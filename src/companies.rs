//! Empresas seguidas, persistidas en `companies.json`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use thiserror::Error;
use tracing::warn;

use crate::{config::is_valid_company_id, models::Company};

#[derive(Debug, Error)]
pub enum CompanyError {
    #[error("ya existe una empresa con id '{0}'")]
    Duplicate(String),
    #[error("id de empresa no válido: '{0}'")]
    InvalidId(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub fn default_companies() -> Vec<Company> {
    vec![
        Company {
            id: "netflix".into(),
            name: "Netflix".into(),
            description: Some("American subscription streaming service and production company".into()),
            logo_url: Some("https://upload.wikimedia.org/wikipedia/commons/thumb/0/08/Netflix_2015_logo.svg/1920px-Netflix_2015_logo.svg.png".into()),
        },
        Company {
            id: "roku".into(),
            name: "Roku".into(),
            description: Some("American manufacturer of digital media players for streaming".into()),
            logo_url: Some("https://upload.wikimedia.org/wikipedia/commons/thumb/8/8c/Roku_logo.svg/1920px-Roku_logo.svg.png".into()),
        },
    ]
}

#[derive(Debug, Clone)]
pub struct CompanyStore {
    path: PathBuf,
}

impl CompanyStore {
    /// Abre el fichero de empresas, creándolo con las empresas por defecto si no existe.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let store = Self {
            path: path.to_path_buf(),
        };
        if !path.exists() {
            store.save(&default_companies())?;
        }
        Ok(store)
    }

    /// Lista de empresas. Un fichero ilegible devuelve las empresas por defecto.
    pub fn list(&self) -> Vec<Company> {
        let parsed = fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Vec<Company>>(&raw).map_err(anyhow::Error::from));
        match parsed {
            Ok(companies) => companies,
            Err(e) => {
                warn!("Error cargando {}: {e}. Se usan las empresas por defecto.", self.path.display());
                default_companies()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Company> {
        let wanted = id.to_lowercase();
        self.list().into_iter().find(|c| c.id.to_lowercase() == wanted)
    }

    pub fn create(&self, company: Company) -> Result<Company, CompanyError> {
        if !is_valid_company_id(&company.id) {
            return Err(CompanyError::InvalidId(company.id));
        }
        let mut companies = self.list();
        if companies.iter().any(|c| c.id.eq_ignore_ascii_case(&company.id)) {
            return Err(CompanyError::Duplicate(company.id));
        }
        companies.push(company.clone());
        self.save(&companies)?;
        Ok(company)
    }

    fn save(&self, companies: &[Company]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(companies)?)
            .with_context(|| format!("Error guardando {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_seeds_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("companies.json");
        let store = CompanyStore::open(&path).unwrap();
        assert!(path.exists());
        let ids: Vec<String> = store.list().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["netflix", "roku"]);
        assert_eq!(store.get("ROKU").unwrap().name, "Roku");
        assert!(store.get("disney").is_none());
    }

    #[test]
    fn create_rejects_duplicate_ids() {
        let dir = tempdir().unwrap();
        let store = CompanyStore::open(&dir.path().join("companies.json")).unwrap();
        let disney = Company {
            id: "disney".into(),
            name: "Disney".into(),
            description: None,
            logo_url: None,
        };
        store.create(disney.clone()).unwrap();
        assert_eq!(store.list().len(), 3);
        assert!(matches!(store.create(disney), Err(CompanyError::Duplicate(_))));
    }

    #[test]
    fn create_rejects_ids_that_would_escape_the_data_dir() {
        let dir = tempdir().unwrap();
        let store = CompanyStore::open(&dir.path().join("companies.json")).unwrap();
        let escape = Company {
            id: "../x".into(),
            name: "X".into(),
            description: None,
            logo_url: None,
        };
        assert!(matches!(store.create(escape), Err(CompanyError::InvalidId(_))));
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("companies.json");
        fs::write(&path, "not json").unwrap();
        let store = CompanyStore::open(&path).unwrap();
        assert_eq!(store.list(), default_companies());
    }
}
