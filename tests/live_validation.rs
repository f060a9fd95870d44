use std::{env, sync::Once};

use multimodal_rag::{
    bootstrap, config, embedding,
    llm::{self, PromptPart},
    pipeline::{AnswerPath, RagApi, RagService},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("QDRANT_COLLECTION_NAME", "multi_modal_rag_live");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        set_default_env("LLM_PROVIDER", "ollama");
        set_default_env("LLM_MODEL", "llama3.2");
        set_default_env("RAG_DATA_DIR", "target/live_rag_store");
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires live Ollama"]
async fn live_ollama_is_reachable() {
    init_config_once();
    let config = config::get_config();
    let status = bootstrap::ensure_ollama(&config.ollama_url, false, std::time::Duration::ZERO)
        .await
        .expect("Ollama should be reachable");
    assert_eq!(status, bootstrap::OllamaStatus::Running);
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let config = config::get_config();
    let client = embedding::build_embedding_client(config).expect("embedding client");
    let vectors = client
        .generate_embeddings(vec!["multimodal rag live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama chat model"]
async fn live_language_model_replies() {
    init_config_once();
    let model = llm::build_language_model(config::get_config()).expect("language model");
    let reply = model
        .complete(&[PromptPart::text("Reply with the single word: pong")])
        .await
        .expect("completion");
    assert!(!reply.trim().is_empty());
}

#[tokio::test]
#[ignore = "Requires live Qdrant and Ollama"]
async fn live_service_answers_after_reset() {
    init_config_once();
    let service = RagService::from_config(config::get_config())
        .await
        .expect("service");
    service.reset().await.expect("reset");
    let answer = service.ask("What is retrieval-augmented generation?").await;
    assert_eq!(answer.path, AnswerPath::ZeroShot, "reply: {}", answer.text);
}
