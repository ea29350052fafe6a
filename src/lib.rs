//! Extracción de temas de negocio y preguntas/respuestas (RAG) sobre los
//! informes de las empresas seguidas (PDFs y JSON de la SEC).

pub mod api;
pub mod app_state;
pub mod cache;
pub mod chunk;
pub mod companies;
pub mod config;
pub mod documents;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod qa;
pub mod theme_store;
pub mod themes;
pub mod tokenizer;
pub mod vector_store;
