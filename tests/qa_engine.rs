mod common;

use std::fs;

use common::{tokenizer, workspace, write_filings, FakeCompletion, FakeEmbedder, DIM};
use filings_themes::{
    cache::{FILE_HASHES_FILE, INDEX_CACHE_FILE, TEXT_CACHE_FILE},
    config::RunConfig,
    llm::ResponseFormat,
    models::Theme,
    qa::{
        activate_company, extract_sources, EngineState, LoadOutcome, PromptBudget, ThemeQa,
        NO_RELEVANT_INFO,
    },
    theme_store::ThemeStore,
};

fn seed_documents(run: &RunConfig) {
    write_filings(
        &run.input_dir.join("netflix_recent.json"),
        &[("10-K", "2024-01-26", "Annual report: ad tier membership grew strongly")],
    );
    write_filings(
        &run.input_dir.join("netflix_older.json"),
        &[("10-Q", "2023-10-20", "Quarterly report: paid sharing lifted revenue")],
    );
}

#[tokio::test]
async fn second_load_reuses_cached_index_without_embedding() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    let embedder = FakeEmbedder::new();
    let completion = FakeCompletion::answering("ok");

    let mut qa = ThemeQa::new(run.clone(), DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();
    assert_eq!(qa.state(), EngineState::Empty);
    let outcome = qa.load_documents().await.unwrap();
    let LoadOutcome::Ingested(summary) = outcome else {
        panic!("se esperaba una ingesta completa, no {outcome:?}");
    };
    assert_eq!(summary.files_extracted, 2);
    assert_eq!(summary.chunks_indexed, 2);
    assert_eq!(qa.state(), EngineState::Loaded);
    assert_eq!(embedder.calls(), 2);

    let mut again = ThemeQa::new(run, DIM, tokenizer(), embedder.clone(), completion).unwrap();
    assert_eq!(again.load_documents().await.unwrap(), LoadOutcome::FromCache { entries: 2 });
    assert_eq!(embedder.calls(), 2);
    assert_eq!(again.index().len(), 2);
}

#[tokio::test]
async fn rebuild_reuses_cached_text_when_hashes_match() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    let embedder = FakeEmbedder::new();
    let completion = FakeCompletion::answering("ok");

    let mut qa = ThemeQa::new(run.clone(), DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();
    qa.load_documents().await.unwrap();

    fs::remove_file(run.cache_dir.join(INDEX_CACHE_FILE)).unwrap();
    let mut rebuilt = ThemeQa::new(run, DIM, tokenizer(), embedder.clone(), completion).unwrap();
    let LoadOutcome::Ingested(summary) = rebuilt.load_documents().await.unwrap() else {
        panic!("sin índice en caché debe reingerir");
    };
    assert_eq!(summary.files_from_cache, 2);
    assert_eq!(summary.files_extracted, 0);
    assert_eq!(embedder.calls(), 4);
}

#[tokio::test]
async fn stale_cached_index_is_served_without_revalidation() {
    // Comportamiento conocido: el índice cacheado se usa tal cual aunque
    // haya documentos nuevos en el directorio.
    let (_dir, run) = workspace();
    seed_documents(&run);
    let embedder = FakeEmbedder::new();
    let completion = FakeCompletion::answering("ok");

    let mut qa = ThemeQa::new(run.clone(), DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();
    qa.load_documents().await.unwrap();

    write_filings(
        &run.input_dir.join("netflix_new.json"),
        &[("8-K", "2024-04-18", "Live sports rights announced")],
    );
    let mut stale = ThemeQa::new(run.clone(), DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();
    assert_eq!(stale.load_documents().await.unwrap(), LoadOutcome::FromCache { entries: 2 });
    assert!(stale.index().documents().iter().all(|d| d.source != "netflix_new.json"));

    // Sólo invalidando se recogen los documentos nuevos.
    stale.invalidate_cache().unwrap();
    assert_eq!(stale.state(), EngineState::Empty);
    assert!(stale.index().is_empty());
    stale.load_documents().await.unwrap();
    assert_eq!(stale.index().len(), 3);
}

#[tokio::test]
async fn empty_index_answers_without_calling_the_model() {
    let (_dir, run) = workspace();
    let embedder = FakeEmbedder::new();
    let completion = FakeCompletion::answering("should not be used");

    let mut qa = ThemeQa::new(run, DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();
    qa.load_documents().await.unwrap();
    assert_eq!(qa.state(), EngineState::Loaded);

    assert_eq!(qa.answer("unrelated question").await, NO_RELEVANT_INFO);
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn missing_input_directory_leaves_an_empty_loaded_index() {
    let (_dir, mut run) = workspace();
    run.input_dir = run.input_dir.join("does-not-exist");
    let embedder = FakeEmbedder::new();
    let completion = FakeCompletion::answering("unused");

    let mut qa = ThemeQa::new(run, DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();
    assert_eq!(qa.load_documents().await.unwrap(), LoadOutcome::MissingInput);
    assert_eq!(qa.state(), EngineState::Loaded);
    assert_eq!(qa.answer("anything?").await, NO_RELEVANT_INFO);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn answer_grounds_prompt_in_documents_and_themes() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    let mut theme = Theme::manual("Ad Tier Growth", "Advertising plan adoption", "Growth", "netflix");
    theme.source = Some("netflix_recent.json (part 1/1)".into());
    ThemeStore::new(&run.output_dir)
        .save("netflix", &[theme, Theme::manual("Live Sports", "Events", "General", "netflix")])
        .unwrap();

    let embedder = FakeEmbedder::new();
    let completion = FakeCompletion::answering(
        "The ad tier is growing.\nSource: netflix_recent.json (part 1/1)",
    );
    let mut qa = ThemeQa::new(run, DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();
    qa.load_documents().await.unwrap();

    let answer = qa.answer("How is the ad tier doing?").await;
    assert_eq!(extract_sources(&answer), vec!["netflix_recent.json (part 1/1)".to_string()]);
    assert_eq!(completion.calls(), 1);

    let (prompt, format) = completion.prompts.lock().unwrap()[0].clone();
    assert_eq!(format, ResponseFormat::Text);
    assert!(prompt.contains("You are analyzing Netflix's investor relations"));
    assert!(prompt.contains("- Ad Tier Growth: Advertising plan adoption (Source: netflix_recent.json (part 1/1))"));
    assert!(prompt.contains("- Live Sports: Events (Source: Manually added)"));
    assert!(prompt.contains("--- Document 1: "));
    assert!(prompt.contains("--- Document 2: "));
}

#[tokio::test]
async fn missing_theme_questions_use_the_absence_template() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    let completion = FakeCompletion::answering("Not enough evidence.");
    let mut qa = ThemeQa::new(run, DIM, tokenizer(), FakeEmbedder::new(), completion.clone()).unwrap();
    qa.load_documents().await.unwrap();

    qa.answer("Why isn't 'Live Sports' listed? Is it missing from the themes?").await;
    let prompt = completion.last_prompt().unwrap();
    assert!(prompt.contains("explain why \"live sports\" might not be included as a theme"));
}

#[tokio::test]
async fn completion_failure_becomes_answer_text() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    let completion = FakeCompletion::failing("rate limited");
    let mut qa = ThemeQa::new(run, DIM, tokenizer(), FakeEmbedder::new(), completion.clone()).unwrap();
    qa.load_documents().await.unwrap();

    let answer = qa.answer("What drives revenue?").await;
    assert!(answer.starts_with("An error occurred while generating the answer: "));
    assert!(answer.contains("rate limited"));
}

#[tokio::test]
async fn failed_embeddings_leave_gaps_instead_of_aborting() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    write_filings(
        &run.input_dir.join("netflix_broken.json"),
        &[("8-K", "2024-02-01", "FAIL_EMBED")],
    );
    let embedder = FakeEmbedder::new();
    let mut qa = ThemeQa::new(run, DIM, tokenizer(), embedder.clone(), FakeCompletion::answering("ok")).unwrap();

    let LoadOutcome::Ingested(summary) = qa.load_documents().await.unwrap() else {
        panic!("se esperaba ingesta");
    };
    assert_eq!(summary.chunks_created, 3);
    assert_eq!(summary.chunks_indexed, 2);
    assert_eq!(summary.embedding_failures, 1);
    assert_eq!(qa.index().len(), 2);
    assert_eq!(embedder.calls(), 3);
}

#[test]
fn top_k_limits_the_retrieved_blocks() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    let budget = PromptBudget {
        top_k: 1,
        ..PromptBudget::default()
    };
    let mut qa = ThemeQa::new(run, DIM, tokenizer(), FakeEmbedder::new(), FakeCompletion::answering("ok"))
        .unwrap()
        .with_budget(budget);

    let plan = tokio_test::block_on(async {
        qa.load_documents().await.unwrap();
        qa.plan("What about the ad tier?").await
    })
    .expect("hay contexto recuperable");
    assert!(plan.prompt.contains("--- Document 1: "));
    assert!(!plan.prompt.contains("--- Document 2: "));
    assert!(!plan.truncated);
}

#[tokio::test]
async fn tiny_budget_falls_back_to_themes_only_prompt() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    let completion = FakeCompletion::answering("Based on the themes...");
    let budget = PromptBudget {
        max_prompt_tokens: 50,
        ..PromptBudget::default()
    };
    let mut qa = ThemeQa::new(run, DIM, tokenizer(), FakeEmbedder::new(), completion.clone())
        .unwrap()
        .with_budget(budget);
    qa.load_documents().await.unwrap();

    assert_eq!(qa.answer("What drives revenue?").await, "Based on the themes...");
    let prompt = completion.last_prompt().unwrap();
    assert!(prompt.contains("I don't have enough context from the documents"));
    assert!(!prompt.contains("--- Document "));
}

#[tokio::test]
async fn unwritable_cache_keeps_the_fresh_index_in_memory() {
    let (_dir, run) = workspace();
    seed_documents(&run);
    let embedder = FakeEmbedder::new();
    let completion = FakeCompletion::answering("Ads are growing.");
    let mut qa = ThemeQa::new(run.clone(), DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();

    // El directorio de caché pasa a ser un fichero: cualquier escritura falla.
    fs::remove_dir_all(&run.cache_dir).unwrap();
    fs::write(&run.cache_dir, "not a directory").unwrap();

    let LoadOutcome::Ingested(summary) = qa.load_documents().await.unwrap() else {
        panic!("se esperaba ingesta");
    };
    assert_eq!(summary.chunks_indexed, 2);
    assert_eq!(qa.state(), EngineState::Loaded);
    assert_eq!(qa.index().len(), 2);
    assert_eq!(qa.answer("ad tier?").await, "Ads are growing.");
    assert_eq!(completion.calls(), 1);
}

#[tokio::test]
async fn switching_company_rebuilds_the_new_engine_from_scratch() {
    let (dir, netflix) = workspace();
    seed_documents(&netflix);
    let roku_input = dir.path().join("roku");
    fs::create_dir_all(&roku_input).unwrap();
    write_filings(
        &roku_input.join("roku_sec.json"),
        &[("10-K", "2024-02-16", "Platform revenue grew")],
    );
    let roku = RunConfig::new("roku", roku_input.clone(), netflix.output_dir.clone(), None);
    let embedder = FakeEmbedder::new();
    let completion = FakeCompletion::answering("ok");

    // Caché previa de Roku que queda desfasada al llegar un fichero nuevo.
    let mut warm = ThemeQa::new(roku.clone(), DIM, tokenizer(), embedder.clone(), completion.clone()).unwrap();
    warm.load_documents().await.unwrap();
    assert_eq!(embedder.calls(), 1);
    write_filings(
        &roku_input.join("roku_q1.json"),
        &[("10-Q", "2024-04-25", "Active accounts up")],
    );
    let stale_index = fs::read(roku.cache_dir.join(INDEX_CACHE_FILE)).unwrap();

    let mut slot = None;
    let built = activate_company(&mut slot, netflix.clone(), DIM, tokenizer(), embedder.clone(), completion.clone())
        .await
        .unwrap();
    assert!(built);
    assert_eq!(embedder.calls(), 3);

    let built = activate_company(&mut slot, netflix, DIM, tokenizer(), embedder.clone(), completion.clone())
        .await
        .unwrap();
    assert!(!built, "la misma empresa reutiliza el motor activo");
    assert_eq!(embedder.calls(), 3);

    let built = activate_company(&mut slot, roku.clone(), DIM, tokenizer(), embedder.clone(), completion)
        .await
        .unwrap();
    assert!(built);
    let qa = slot.as_ref().unwrap();
    assert_eq!(qa.company_id(), "roku");
    assert_eq!(qa.state(), EngineState::Loaded);
    assert_eq!(qa.index().len(), 2, "la caché desfasada no se reutiliza");
    assert_eq!(embedder.calls(), 5);
    for file in [TEXT_CACHE_FILE, FILE_HASHES_FILE, INDEX_CACHE_FILE] {
        assert!(roku.cache_dir.join(file).exists(), "{file} reconstruido");
    }
    assert_ne!(fs::read(roku.cache_dir.join(INDEX_CACHE_FILE)).unwrap(), stale_index);
}
