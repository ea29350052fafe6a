//! Preguntas y respuestas sobre los temas de una empresa (RAG).
//!
//! Flujo de `answer`:
//!   1. Embedding de la pregunta y búsqueda de los `top_k` chunks más cercanos.
//!   2. Contexto con bloques `--- Document i: ... ---` hasta el límite de tokens.
//!   3. Resumen de los primeros temas almacenados.
//!   4. Plantilla estándar o de "tema ausente" según la pregunta.
//!   5. Si el prompt se pasa del presupuesto, se recortan bloques completos
//!      del final; si ni así cabe, se usa la plantilla sólo con temas.
//!   6. Llamada al modelo; un fallo se devuelve como texto de respuesta.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use regex::Regex;
use tracing::{error, info, warn};

use crate::{
    cache::IngestionCache,
    chunk::TextChunker,
    config::RunConfig,
    error::PipelineError,
    ingest::{ingest_directory, IngestionSummary},
    llm::{CompletionProvider, EmbeddingProvider, ResponseFormat},
    models::Theme,
    prompts,
    theme_store::ThemeStore,
    tokenizer::Tokenizer,
    vector_store::{SearchHit, VectorIndex},
};

pub const NO_RELEVANT_INFO: &str =
    "I couldn't find any relevant information in the source documents to answer your question.";

const DOCUMENT_MARKER: &str = "--- Document ";
const MISSING_THEME_PLACEHOLDER: &str = "the mentioned theme";
const MISSING_THEME_KEYWORDS: [&str; 7] = [
    "missing",
    "not included",
    "isn't listed",
    "not listed",
    "absent",
    "omitted",
    "excluded",
];

/// Límites de tokens y de recuperación para construir el prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBudget {
    pub max_prompt_tokens: usize,
    /// Tokens reservados para plantilla, pregunta y temas.
    pub context_reserve_tokens: usize,
    /// Margen extra al calcular cuánto contexto recortar.
    pub truncation_buffer_tokens: usize,
    pub top_k: usize,
    pub max_themes_in_prompt: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_prompt_tokens: 20_000,
            context_reserve_tokens: 2_000,
            truncation_buffer_tokens: 500,
            top_k: 5,
            max_themes_in_prompt: 10,
        }
    }
}

impl PromptBudget {
    pub fn context_limit(&self) -> usize {
        self.max_prompt_tokens
            .saturating_sub(self.context_reserve_tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    Standard,
    /// Pregunta sobre un tema que no aparece; lleva el nombre citado o un genérico.
    MissingTheme(String),
}

fn quoted_theme() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:why isn't|why is not|why isn't the theme|why is the theme) ['"](.*?)['"]"#)
            .expect("regex de tema citado válida")
    })
}

pub fn classify_question(question: &str) -> QuestionKind {
    let lower = question.to_lowercase();
    if !MISSING_THEME_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return QuestionKind::Standard;
    }
    let theme = quoted_theme()
        .captures(&lower)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| MISSING_THEME_PLACEHOLDER.to_string());
    QuestionKind::MissingTheme(theme)
}

/// Concatena bloques por relevancia hasta que el siguiente no cabe en `limit`.
pub fn build_context(hits: &[SearchHit], tokenizer: &Tokenizer, limit: usize) -> String {
    let mut context = String::new();
    let mut total = 0;
    for (i, hit) in hits.iter().enumerate() {
        let block = format!(
            "\n{DOCUMENT_MARKER}{}: {} ---\n{}\n",
            i + 1,
            hit.metadata.label(),
            hit.metadata.content
        );
        let tokens = tokenizer.count(&block);
        if total + tokens > limit {
            info!("Se detiene en {i} chunks para no superar el límite de tokens");
            break;
        }
        context.push_str(&block);
        total += tokens;
    }
    context
}

/// Lista con viñetas de los primeros `max` temas.
pub fn summarize_themes(themes: &[Theme], max: usize) -> String {
    let mut out = String::new();
    for theme in themes.iter().take(max) {
        out.push_str(&format!(
            "- {}: {} (Source: {})\n",
            theme.name,
            theme.description,
            theme.source.as_deref().unwrap_or("Manually added")
        ));
    }
    if themes.len() > max {
        out.push_str(&format!("- ... and {} more themes\n", themes.len() - max));
    }
    out
}

/// Conserva la cabecera previa al primer bloque y los bloques completos que
/// caben en `keep_tokens`. Devuelve el contexto, sus tokens contados por
/// partes y el número de bloques conservados.
fn truncate_context(context: &str, keep_tokens: usize, tokenizer: &Tokenizer) -> (String, usize, usize) {
    let mut parts = context.split(DOCUMENT_MARKER);
    let head = parts.next().unwrap_or("");
    let mut kept = head.to_string();
    let mut tokens = tokenizer.count(head);
    let mut blocks = 0;

    for part in parts {
        let block = format!("{DOCUMENT_MARKER}{part}");
        let block_tokens = tokenizer.count(&block);
        if tokens + block_tokens > keep_tokens {
            break;
        }
        kept.push_str(&block);
        tokens += block_tokens;
        blocks += 1;
    }
    (kept, tokens, blocks)
}

/// Prompt final y cómo se obtuvo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPlan {
    pub prompt: String,
    pub tokens: usize,
    pub truncated: bool,
    pub fallback: bool,
}

pub fn compose_prompt(
    company: &str,
    question: &str,
    kind: &QuestionKind,
    theme_info: &str,
    context: &str,
    tokenizer: &Tokenizer,
    budget: &PromptBudget,
) -> PromptPlan {
    let render = |header: &str, ctx: &str| match kind {
        QuestionKind::Standard => prompts::qa_standard(company, question, theme_info, header, ctx),
        QuestionKind::MissingTheme(theme) => {
            prompts::qa_missing_theme(company, question, theme_info, theme, header, ctx)
        }
    };
    let fallback = || {
        let prompt = prompts::qa_themes_only(company, question, theme_info);
        PromptPlan {
            tokens: tokenizer.count(&prompt),
            prompt,
            truncated: true,
            fallback: true,
        }
    };

    let prompt = render(prompts::EXCERPTS_HEADER, context);
    let prompt_tokens = tokenizer.count(&prompt);
    info!("Tokens totales del prompt: {prompt_tokens}");
    if prompt_tokens <= budget.max_prompt_tokens {
        return PromptPlan {
            prompt,
            tokens: prompt_tokens,
            truncated: false,
            fallback: false,
        };
    }

    warn!(
        "El prompt supera el límite de tokens ({prompt_tokens} > {})",
        budget.max_prompt_tokens
    );
    let context_tokens = tokenizer.count(context);
    let excess = prompt_tokens - budget.max_prompt_tokens + budget.truncation_buffer_tokens;
    if excess >= context_tokens {
        return fallback();
    }

    let mut keep = context_tokens - excess;
    loop {
        let (truncated, kept_tokens, blocks) = truncate_context(context, keep, tokenizer);
        let prompt = render(prompts::TRUNCATED_EXCERPTS_HEADER, &truncated);
        let tokens = tokenizer.count(&prompt);
        if tokens <= budget.max_prompt_tokens {
            return PromptPlan {
                prompt,
                tokens,
                truncated: true,
                fallback: false,
            };
        }
        if blocks == 0 {
            return fallback();
        }
        // Forzar la eliminación de al menos un bloque más.
        keep = kept_tokens.saturating_sub(1);
    }
}

/// Fuentes citadas en una respuesta (`Source: ...` y `Document N: ...`), sin repetir.
pub fn extract_sources(answer: &str) -> Vec<String> {
    static SOURCE: OnceLock<Regex> = OnceLock::new();
    static DOCUMENT: OnceLock<Regex> = OnceLock::new();
    let source = SOURCE.get_or_init(|| Regex::new(r"Source: ([^\n]+)").expect("regex válida"));
    let document =
        DOCUMENT.get_or_init(|| Regex::new(r"Document \d+: ([^\n]+)").expect("regex válida"));

    let mut sources: Vec<String> = Vec::new();
    for re in [source, document] {
        for cap in re.captures_iter(answer) {
            let found = cap[1].trim().to_string();
            if !sources.contains(&found) {
                sources.push(found);
            }
        }
    }
    sources
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Empty,
    Loaded,
}

/// Cómo se cargaron los documentos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Índice serializado reutilizado tal cual, sin revisar hashes.
    FromCache { entries: usize },
    Ingested(IngestionSummary),
    /// El directorio de entrada no existe; el índice queda vacío.
    MissingInput,
}

/// Motor de preguntas de una empresa.
pub struct ThemeQa {
    run: RunConfig,
    budget: PromptBudget,
    dimension: usize,
    tokenizer: Arc<Tokenizer>,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionProvider>,
    cache: IngestionCache,
    index: VectorIndex,
    themes: Vec<Theme>,
    state: EngineState,
}

impl ThemeQa {
    pub fn new(
        run: RunConfig,
        dimension: usize,
        tokenizer: Arc<Tokenizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Result<Self> {
        let cache = IngestionCache::open(&run.cache_dir)?;
        let chunker = TextChunker::new(
            tokenizer.clone(),
            run.chunking.max_tokens,
            run.chunking.overlap_tokens,
        );
        let themes = ThemeStore::new(&run.output_dir).load(&run.company_id);
        info!("{} temas cargados para {}", themes.len(), run.company_name);

        Ok(Self {
            run,
            budget: PromptBudget::default(),
            dimension,
            tokenizer,
            chunker,
            embedder,
            completion,
            cache,
            index: VectorIndex::new(dimension),
            themes,
            state: EngineState::Empty,
        })
    }

    pub fn with_budget(mut self, budget: PromptBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn company_id(&self) -> &str {
        &self.run.company_id
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    /// Vuelve a leer `{c}_themes.json`.
    pub fn reload_themes(&mut self) {
        self.themes = ThemeStore::new(&self.run.output_dir).load(&self.run.company_id);
    }

    /// Carga el índice desde caché o, si no hay, ingiere el directorio de entrada.
    pub async fn load_documents(&mut self) -> Result<LoadOutcome> {
        self.reload_themes();

        if let Some(index) = self.cache.load_index() {
            if index.dimension() == self.dimension {
                let entries = index.len();
                info!("Índice vectorial cargado desde caché ({entries} chunks)");
                self.index = index;
                self.state = EngineState::Loaded;
                return Ok(LoadOutcome::FromCache { entries });
            }
            warn!(
                "Índice en caché con dimensión {} (se esperaba {}); se reconstruye.",
                index.dimension(),
                self.dimension
            );
        }

        if !self.run.input_dir.is_dir() {
            error!("El directorio de entrada no existe: {}", self.run.input_dir.display());
            self.index = VectorIndex::new(self.dimension);
            self.state = EngineState::Loaded;
            return Ok(LoadOutcome::MissingInput);
        }

        let mut index = VectorIndex::new(self.dimension);
        let summary = ingest_directory(
            &self.run.input_dir,
            &mut self.cache,
            &self.chunker,
            self.embedder.as_ref(),
            &mut index,
        )
        .await?;
        if let Err(e) = self.cache.save(&index) {
            let err = PipelineError::CacheWrite {
                artifact: self.run.cache_dir.display().to_string(),
                reason: format!("{e:#}"),
            };
            error!(kind = err.kind(), "{err}");
        }

        info!("{} chunks cargados en el índice vectorial. {summary}", index.len());
        self.index = index;
        self.state = EngineState::Loaded;
        Ok(LoadOutcome::Ingested(summary))
    }

    /// Descarta los tres artefactos de caché y vacía el índice en memoria.
    pub fn invalidate_cache(&mut self) -> Result<()> {
        self.cache.invalidate()?;
        self.index = VectorIndex::new(self.dimension);
        self.state = EngineState::Empty;
        Ok(())
    }

    /// Construye el prompt de una pregunta, o `None` si no hay contexto recuperable.
    pub async fn plan(&self, question: &str) -> Option<PromptPlan> {
        if self.index.is_empty() {
            return None;
        }

        let embedding = match self.embedder.embed(question).await {
            Ok(v) => v,
            Err(e) => {
                let err = PipelineError::Embedding {
                    label: "pregunta".to_string(),
                    reason: format!("{e:#}"),
                };
                warn!(kind = err.kind(), "{err}");
                Vec::new()
            }
        };

        let mut hits = self.index.search(&embedding, self.budget.top_k);
        if hits.is_empty() {
            return None;
        }
        hits.sort_by(|a, b| a.score.total_cmp(&b.score));

        let context = build_context(&hits, &self.tokenizer, self.budget.context_limit());
        let theme_info = summarize_themes(&self.themes, self.budget.max_themes_in_prompt);
        let kind = classify_question(question);

        Some(compose_prompt(
            &self.run.company_name,
            question,
            &kind,
            &theme_info,
            &context,
            &self.tokenizer,
            &self.budget,
        ))
    }

    /// Responde siempre con texto: los fallos del modelo se devuelven como mensaje.
    pub async fn answer(&self, question: &str) -> String {
        info!("Respondiendo pregunta: {question}");
        let Some(plan) = self.plan(question).await else {
            return NO_RELEVANT_INFO.to_string();
        };

        match self
            .completion
            .complete(prompts::SYSTEM_PROMPT, &plan.prompt, ResponseFormat::Text)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                let err = PipelineError::Completion {
                    context: "respuesta a pregunta".to_string(),
                    reason: format!("{e:#}"),
                };
                error!(kind = err.kind(), "{err}");
                format!("An error occurred while generating the answer: {e}")
            }
        }
    }
}

/// Deja en `slot` el motor de la empresa de `run`.
///
/// Si ya hay otro motor activo, el nuevo invalida su propia caché antes de
/// cargar documentos; el primer motor de la sesión reutiliza la caché.
/// Devuelve `true` si se construyó un motor nuevo.
pub async fn activate_company(
    slot: &mut Option<ThemeQa>,
    run: RunConfig,
    dimension: usize,
    tokenizer: Arc<Tokenizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionProvider>,
) -> Result<bool> {
    let active = slot.as_ref().map(|qa| qa.company_id().to_string());
    if active.as_deref() == Some(run.company_id.as_str()) {
        return Ok(false);
    }

    info!("Empresa activa: {:?} -> {}", active, run.company_id);
    let mut fresh = ThemeQa::new(run, dimension, tokenizer, embedder, completion)?;
    if active.is_some() {
        fresh.invalidate_cache()?;
    }
    fresh.load_documents().await?;
    *slot = Some(fresh);
    Ok(true)
}
