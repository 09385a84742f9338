mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{manager, MockBackend};
use murmur_session::{
    AppConfig, ChatError, ConfigKey, ConfigStore, Conversation, LoadOutcome, MemoryStore,
    ModelDescriptor, PromptTemplate, SendOutcome, SessionError, SkipReason,
};

fn catalog() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new("Gemma-3-1B", "gemma-1b.gguf"),
        ModelDescriptor::new("Gemma-3-4B", "gemma-4b.gguf"),
    ]
}

fn conversation(
    backend: Arc<MockBackend>,
    store: Arc<MemoryStore>,
) -> Conversation<MockBackend, MemoryStore> {
    Conversation::new(manager(backend), store, catalog())
}

async fn ready_conversation() -> (Arc<MockBackend>, Conversation<MockBackend, MemoryStore>) {
    let backend = Arc::new(MockBackend::new());
    let chat = conversation(backend.clone(), Arc::new(MemoryStore::new()));
    chat.select_model("Gemma-3-1B").await.unwrap();
    (backend, chat)
}

#[tokio::test]
async fn test_untemplated_prompt_format() {
    let (_, chat) = ready_conversation().await;
    assert_eq!(
        chat.build_prompt("Hello"),
        "<start_of_turn>user\nHello\n<end_of_turn>\n<start_of_turn>model"
    );
}

#[tokio::test]
async fn test_yoda_template_precedes_user_text() {
    let (_, chat) = ready_conversation().await;
    chat.select_prompt("Yoda Style").unwrap();

    let prompt = chat.build_prompt("I am tired");
    let body = chat.selected_prompt().unwrap().body;

    assert_eq!(
        prompt,
        format!(
            "<start_of_turn>user\n{}\n\nI am tired\n<end_of_turn>\n<start_of_turn>model",
            body
        )
    );
    assert!(body.contains("Yoda"));
}

#[tokio::test]
async fn test_send_appends_record() {
    let (_, chat) = ready_conversation().await;

    let outcome = chat.send_message("Hello").await.unwrap();
    let SendOutcome::Sent(record) = outcome else {
        panic!("expected a sent message, got {:?}", outcome);
    };
    assert_eq!(record.model_name, "Gemma-3-1B");
    assert_eq!(record.task_label, "Normal Chat");
    assert_eq!(record.input_text, "Hello");
    assert_eq!(chat.transcript(), vec![record]);

    chat.select_prompt("Caesar Style").unwrap();
    chat.send_message("Apes together").await.unwrap();
    assert_eq!(chat.transcript()[1].task_label, "Caesar Style");
}

#[tokio::test]
async fn test_clear_transcript_then_send() {
    let (backend, chat) = ready_conversation().await;
    chat.send_message("one").await.unwrap();
    chat.send_message("two").await.unwrap();
    chat.select_prompt("Yoda Style").unwrap();

    chat.clear_transcript();
    assert!(chat.transcript().is_empty());
    assert!(chat.is_selected_model_ready(), "session untouched");
    assert_eq!(chat.selected_prompt().map(|p| p.label).as_deref(), Some("Yoda Style"));
    assert_eq!(backend.live(), 1);

    chat.send_message("three").await.unwrap();
    assert_eq!(chat.transcript().len(), 1);
}

#[tokio::test]
async fn test_send_skips() {
    let backend = Arc::new(MockBackend::with_delays(
        Duration::from_millis(20),
        Duration::from_millis(30),
    ));
    let chat = conversation(backend.clone(), Arc::new(MemoryStore::new()));

    let test_cases = vec![("empty", ""), ("whitespace only", "  \n\t ")];
    for (description, text) in test_cases {
        assert_eq!(
            chat.send_message(text).await.unwrap(),
            SendOutcome::Skipped(SkipReason::Blank),
            "{}",
            description
        );
    }

    assert_eq!(
        chat.send_message("hi").await.unwrap(),
        SendOutcome::Skipped(SkipReason::NotReady),
        "nothing loaded"
    );

    chat.select_model("Gemma-3-1B").await.unwrap();
    let (first, second) = tokio::join!(chat.send_message("one"), chat.send_message("two"));
    assert!(matches!(first, Ok(SendOutcome::Sent(_))));
    assert_eq!(second.unwrap(), SendOutcome::Skipped(SkipReason::Busy));

    assert_eq!(chat.transcript().len(), 1);
    assert_eq!(backend.count("generate"), 2, "warmup plus one message");
}

#[tokio::test]
async fn test_send_skipped_while_warming() {
    let backend = Arc::new(MockBackend::with_delays(
        Duration::ZERO,
        Duration::from_millis(40),
    ));
    let chat = Arc::new(conversation(backend.clone(), Arc::new(MemoryStore::new())));
    let mut events = chat.session().subscribe();

    let loader = {
        let chat = chat.clone();
        tokio::spawn(async move { chat.select_model("Gemma-3-1B").await })
    };
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        if matches!(event, murmur_session::SessionEvent::Warming { .. }) {
            break;
        }
    }

    assert_eq!(
        chat.send_message("too early").await.unwrap(),
        SendOutcome::Skipped(SkipReason::Warming)
    );
    loader.await.unwrap().unwrap();
    assert!(chat.transcript().is_empty());
}

#[tokio::test]
async fn test_generation_failure_appends_nothing() {
    let (backend, chat) = ready_conversation().await;
    backend.fail_generate.store(true, Ordering::SeqCst);

    let err = chat.send_message("Hello").await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::Session(SessionError::GenerationFailure(_))
    ));
    assert!(chat.transcript().is_empty());
    assert!(chat.is_selected_model_ready());
}

#[tokio::test]
async fn test_submit_input_takes_buffer() {
    let (backend, chat) = ready_conversation().await;

    chat.input().set("from speech");
    let outcome = chat.submit_input().await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(ref r) if r.input_text == "from speech"));
    assert_eq!(chat.input().get(), "");

    // Input is not restored on failure
    backend.fail_generate.store(true, Ordering::SeqCst);
    chat.input().set("lost");
    assert!(chat.submit_input().await.is_err());
    assert_eq!(chat.input().get(), "");
    assert_eq!(chat.transcript().len(), 1);
}

#[tokio::test]
async fn test_skipped_submit_keeps_input() {
    let backend = Arc::new(MockBackend::new());
    let chat = conversation(backend.clone(), Arc::new(MemoryStore::new()));

    let test_cases = vec![
        ("nothing loaded", "dictated sentence", SkipReason::NotReady),
        ("blank input", "   ", SkipReason::Blank),
    ];

    for (description, input, reason) in test_cases {
        chat.input().set(input);
        let outcome = chat.submit_input().await.unwrap();
        assert_eq!(outcome, SendOutcome::Skipped(reason), "{}", description);
        assert_eq!(chat.input().get(), input, "{}", description);
    }

    // Once the model is up the same text goes out
    chat.select_model("Gemma-3-1B").await.unwrap();
    chat.input().set("dictated sentence");
    let outcome = chat.submit_input().await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(ref r) if r.input_text == "dictated sentence"));
    assert_eq!(chat.input().get(), "");
    assert_eq!(backend.count("load"), 1);
}

#[tokio::test]
async fn test_select_prompt_unknown_label() {
    let (_, chat) = ready_conversation().await;
    chat.select_prompt("Yoda Style").unwrap();

    let err = chat.select_prompt("Pirate").unwrap_err();
    assert!(matches!(err, ChatError::UnknownTemplate(ref label) if label == "Pirate"));
    assert_eq!(chat.selected_prompt().map(|p| p.label).as_deref(), Some("Yoda Style"));

    chat.clear_prompt();
    assert!(chat.selected_prompt().is_none());
}

#[tokio::test]
async fn test_update_prompt_persists_full_set() {
    let store = Arc::new(MemoryStore::new());
    let chat = conversation(Arc::new(MockBackend::new()), store.clone());

    let test_cases = vec![
        (
            "replace existing",
            PromptTemplate::new("Yoda Style", "Speak like Yoda you must."),
            4,
        ),
        (
            "append new",
            PromptTemplate::new("Pirate", "Talk like a pirate."),
            5,
        ),
    ];

    for (description, template, expected_len) in test_cases {
        chat.update_prompt(template.clone()).unwrap();

        assert_eq!(chat.selected_prompt(), Some(template.clone()), "{}", description);
        let saved = store.get(&ConfigKey::PROMPTS).unwrap();
        assert_eq!(saved.len(), expected_len, "{}", description);
        assert_eq!(saved, chat.prompts(), "{}", description);
        assert!(saved.contains(&template), "{}", description);
    }

    // A new conversation over the same store restores the saved set
    let restored = conversation(Arc::new(MockBackend::new()), store);
    assert_eq!(restored.prompts().len(), 5);
    assert!(restored.selected_prompt().is_none());
}

#[tokio::test]
async fn test_model_selection() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockBackend::new());
    let chat = conversation(backend.clone(), store.clone());

    assert_eq!(chat.selected_model().map(|m| m.name).as_deref(), Some("Gemma-3-1B"));
    assert!(!chat.is_selected_model_ready());

    let err = chat.select_model("Llama").await.unwrap_err();
    assert!(matches!(err, ChatError::UnknownModel(ref name) if name == "Llama"));

    let outcome = chat.select_model("Gemma-3-4B").await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Loaded(_)));
    assert!(chat.is_selected_model_ready());
    assert_eq!(
        store.get(&ConfigKey::APP).and_then(|c: AppConfig| c.selected_model).as_deref(),
        Some("Gemma-3-4B")
    );

    assert_eq!(
        chat.select_model("Gemma-3-4B").await.unwrap(),
        LoadOutcome::AlreadyLoaded
    );
    assert_eq!(backend.count("load"), 1);

    // The saved selection survives a restart
    let restored = conversation(Arc::new(MockBackend::new()), store);
    assert_eq!(
        restored.selected_model().map(|m| m.name).as_deref(),
        Some("Gemma-3-4B")
    );
}

#[tokio::test]
async fn test_load_failure_then_valid_request() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_load_of("gemma-1b.gguf");
    let chat = conversation(backend.clone(), Arc::new(MemoryStore::new()));

    let err = chat.select_model("Gemma-3-1B").await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::Session(SessionError::LoadFailure { .. })
    ));
    assert_eq!(
        chat.send_message("hi").await.unwrap(),
        SendOutcome::Skipped(SkipReason::NotReady)
    );

    chat.select_model("Gemma-3-4B").await.unwrap();
    assert!(matches!(
        chat.send_message("hi").await.unwrap(),
        SendOutcome::Sent(_)
    ));
}
