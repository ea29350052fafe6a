use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    companies::{CompanyError, CompanyStore},
    config::is_valid_company_id,
    documents,
    llm::{CompletionProvider, EmbeddingProvider},
    models::{Company, DocumentInfo, QuestionRequest, QuestionResponse, Theme, ThemeCreate},
    pipeline::{load_processed_files, ThemePipeline},
    qa::{activate_company, extract_sources},
    theme_store::{ThemeStore, ThemeStoreError},
};

const DEFAULT_COMPANY: &str = "netflix";

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

// --- Payloads ---

#[derive(Deserialize)]
pub struct CompanyQuery {
    company_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ExtractPayload {
    company_id: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/companies", get(list_companies_handler).post(create_company_handler))
        .route("/api/companies/:id", get(get_company_handler))
        .route("/api/themes", get(list_themes_handler).post(create_theme_handler))
        .route(
            "/api/themes/:name",
            get(get_theme_handler)
                .put(update_theme_handler)
                .delete(delete_theme_handler),
        )
        .route("/api/documents", get(list_documents_handler))
        .route("/api/questions/ask", post(ask_question_handler))
        .route("/api/extract", post(extract_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

fn company_store(state: &AppState) -> Result<CompanyStore, ApiError> {
    CompanyStore::open(&state.config.companies_file())
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
}

/// Los ids de empresa acaban en rutas del disco: sólo se aceptan los que sirven
/// como nombre de fichero.
fn company_id_param(raw: &str) -> Result<String, ApiError> {
    let id = raw.trim().to_lowercase();
    if !is_valid_company_id(&id) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("company_id no válido: '{raw}'"),
        ));
    }
    Ok(id)
}

/// Como `company_id_param`, pero además la empresa debe estar registrada.
fn known_company_id(state: &AppState, raw: &str) -> Result<String, ApiError> {
    let id = company_id_param(raw)?;
    if company_store(state)?.get(&id).is_none() {
        return Err(api_error(StatusCode::NOT_FOUND, format!("Empresa '{id}' no encontrada")));
    }
    Ok(id)
}

fn theme_store(state: &AppState) -> ThemeStore {
    ThemeStore::new(&state.config.default_output_dir())
}

// --- Handlers ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    let status = state
        .status
        .lock()
        .map(|s| s.clone())
        .unwrap_or_else(|_| Status::idle("Estado no disponible."));
    Json(status)
}

#[axum::debug_handler]
async fn list_companies_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Company>>, ApiError> {
    Ok(Json(company_store(&state)?.list()))
}

#[axum::debug_handler]
async fn get_company_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Company>, ApiError> {
    company_store(&state)?
        .get(&id)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Empresa '{id}' no encontrada")))
}

#[axum::debug_handler]
async fn create_company_handler(
    State(state): State<AppState>,
    Json(company): Json<Company>,
) -> Result<impl IntoResponse, ApiError> {
    match company_store(&state)?.create(company) {
        Ok(created) => Ok((StatusCode::CREATED, Json(created))),
        Err(e @ (CompanyError::Duplicate(_) | CompanyError::InvalidId(_))) => Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[axum::debug_handler]
async fn list_themes_handler(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Vec<Theme>>, ApiError> {
    let store = theme_store(&state);
    let themes = match query.company_id {
        Some(id) => store.load(&company_id_param(&id)?),
        None => store.load_all(),
    };
    Ok(Json(themes))
}

#[axum::debug_handler]
async fn get_theme_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Theme>, ApiError> {
    let company_id = company_id_param(query.company_id.as_deref().unwrap_or(DEFAULT_COMPANY))?;
    theme_store(&state)
        .get(&company_id, &name)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Tema '{name}' no encontrado")))
}

fn theme_error(e: ThemeStoreError) -> ApiError {
    match e {
        ThemeStoreError::Duplicate { .. } => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        ThemeStoreError::NotFound { .. } => api_error(StatusCode::NOT_FOUND, e.to_string()),
        ThemeStoreError::Storage(_) => {
            error!("Error de almacenamiento de temas: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[axum::debug_handler]
async fn create_theme_handler(
    State(state): State<AppState>,
    Json(payload): Json<ThemeCreate>,
) -> Result<impl IntoResponse, ApiError> {
    company_id_param(&payload.company_id)?;
    let theme = theme_store(&state)
        .add_manual(payload, false)
        .map_err(theme_error)?;
    Ok((StatusCode::CREATED, Json(theme)))
}

#[axum::debug_handler]
async fn update_theme_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<ThemeCreate>,
) -> Result<Json<Theme>, ApiError> {
    company_id_param(&payload.company_id)?;
    theme_store(&state)
        .update(&name, payload)
        .map(Json)
        .map_err(theme_error)
}

#[axum::debug_handler]
async fn delete_theme_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<CompanyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(company_id) = query.company_id else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Falta el parámetro company_id"));
    };
    theme_store(&state)
        .delete(&company_id_param(&company_id)?, &name)
        .map_err(theme_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn list_documents_handler(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Vec<DocumentInfo>>, ApiError> {
    let company_id = query.company_id.as_deref().map(company_id_param).transpose()?;
    let companies = company_store(&state)?.list();
    let processed = load_processed_files(
        &state
            .config
            .default_output_dir()
            .join(crate::config::PROCESSED_FILES_JSON),
    );
    Ok(Json(documents::list_documents(
        &state.config.tracked_companies_dir(),
        &companies,
        company_id.as_deref(),
        &processed,
    )))
}

/// Responde con el motor de la empresa pedida; si cambia la empresa activa,
/// el nuevo motor invalida su caché y recarga documentos antes de responder.
#[axum::debug_handler]
async fn ask_question_handler(
    State(state): State<AppState>,
    Json(payload): Json<QuestionRequest>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let internal = |e: anyhow::Error| {
        error!("Error respondiendo la pregunta: {e:#}");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error answering question: {e}"),
        )
    };

    let requested = payload
        .company_id
        .as_deref()
        .map(|raw| known_company_id(&state, raw))
        .transpose()?;

    let mut engine = state.qa_engine.lock().await;
    let company_id = requested
        .or_else(|| engine.as_ref().map(|e| e.company_id().to_string()))
        .unwrap_or_else(|| DEFAULT_COMPANY.to_string());

    let embedder: Arc<dyn EmbeddingProvider> = state.llm_manager.clone();
    let completion: Arc<dyn CompletionProvider> = state.llm_manager.clone();
    activate_company(
        &mut engine,
        state.config.run_for(&company_id),
        state.config.embedding_dimensions,
        state.tokenizer.clone(),
        embedder,
        completion,
    )
    .await
    .map_err(internal)?;

    let Some(qa) = engine.as_mut() else {
        return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Motor de preguntas no disponible"));
    };
    qa.reload_themes();
    let answer = qa.answer(&payload.question).await;
    let sources = extract_sources(&answer);

    Ok(Json(QuestionResponse {
        question: payload.question,
        answer,
        sources,
    }))
}

#[axum::debug_handler]
async fn extract_handler(
    State(state): State<AppState>,
    Json(payload): Json<ExtractPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let company_id = known_company_id(&state, &payload.company_id)?;
    {
        let mut status = state
            .status
            .lock()
            .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Estado no disponible"))?;
        if status.is_busy {
            return Err(api_error(StatusCode::CONFLICT, "Ya hay una extracción en curso."));
        }
        status.is_busy = true;
        status.message = format!("Iniciando extracción de temas para {company_id}...");
        status.progress = 0.0;
    }

    spawn(async move {
        let run = state.config.run_for(&company_id);
        let completion: Arc<dyn CompletionProvider> = state.llm_manager.clone();
        let pipeline = ThemePipeline::new(run, state.tokenizer.clone(), completion)
            .with_status(state.status.clone());
        let result = pipeline.run().await;

        if let Ok(mut status) = state.status.lock() {
            status.is_busy = false;
            status.progress = 0.0;
            match result {
                Ok(summary) => {
                    status.message = format!("¡Extracción completada! {}", summary);
                }
                Err(err) => {
                    status.message = format!("Error en la extracción: {}", err);
                    error!("Error de extracción: {:#}", err);
                }
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Ok(mut sender) = state.shutdown_sender.lock() {
        if let Some(sender) = sender.take() {
            let _ = sender.send(());
        }
    }
    StatusCode::OK
}
