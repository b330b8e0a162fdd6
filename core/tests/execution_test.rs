mod common;

use common::{InMemoryStore, MockApplier, MockTransport};
use montage_core::execution::FailureKind;
use montage_core::{
    ConversationSummary, EngineConfig, ExecutionAgent, ExecutionContext, IntentCategory, LlmReply,
    MontageError, OrderEntry, ProgressBroadcaster,
};
use std::sync::Arc;
use std::time::Duration;

const PROJECT: &str = "p-exec";

fn agent(transport: MockTransport, store: InMemoryStore) -> ExecutionAgent {
    ExecutionAgent::new(
        Arc::new(transport),
        Arc::new(store),
        EngineConfig::default().with_llm_timeout_ms(200),
    )
}

fn confirmed(category: IntentCategory) -> ConversationSummary {
    ConversationSummary {
        confirmed: true,
        ..ConversationSummary::new(category)
    }
}

#[tokio::test]
async fn test_unconfirmed_or_missing_intent_never_reaches_model() {
    let mut transport = MockTransport::new();
    transport.expect_complete().never();
    let mut applier = MockApplier::new();
    applier.expect_apply().never();
    let agent = agent(transport, InMemoryStore::with_project(PROJECT, &["h1"]));
    let progress = ProgressBroadcaster::silent();
    let ctx = ExecutionContext {
        api_key: "k",
        model: "gpt-4o-mini",
        progress: &progress,
    };

    let result = agent
        .execute_summary(Some(ConversationSummary::new(IntentCategory::Reorder)), PROJECT, &applier, &ctx)
        .await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Validation));

    let result = agent.execute_summary(None, PROJECT, &applier, &ctx).await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_fenced_json_with_prose_is_accepted() {
    let mut transport = MockTransport::new();
    transport.expect_complete().times(1).returning(|_, req| {
        assert_eq!(req.max_tokens, 2_000);
        Ok(LlmReply::text(
            "Here you go:\n```json\n{\"new_order\": [\"b\", \"a\"], \"reasoning\": \"b is punchier\"}\n```",
        ))
    });
    let mut applier = MockApplier::new();
    applier.expect_apply().times(1).returning(|_, _| Ok(()));

    let agent = agent(transport, InMemoryStore::with_project(PROJECT, &["a", "b"]));
    let progress = ProgressBroadcaster::silent();
    let result = agent
        .execute_summary(
            Some(confirmed(IntentCategory::ImproveHook)),
            PROJECT,
            &applier,
            &ExecutionContext {
                api_key: "k",
                model: "gpt-4o-mini",
                progress: &progress,
            },
        )
        .await;

    assert!(result.success);
    assert!(result.applied);
    assert_eq!(result.new_order, vec![OrderEntry::item("b"), OrderEntry::item("a")]);
    assert_eq!(result.summary, "The video now opens with \"Highlight b\".");
}

#[tokio::test]
async fn test_unparseable_reply_is_parse_failure() {
    let mut transport = MockTransport::new();
    transport
        .expect_complete()
        .returning(|_, _| Ok(LlmReply::text("I think b should go first.")));
    let mut applier = MockApplier::new();
    applier.expect_apply().never();

    let agent = agent(transport, InMemoryStore::with_project(PROJECT, &["a", "b"]));
    let progress = ProgressBroadcaster::silent();
    let result = agent
        .execute_summary(
            Some(confirmed(IntentCategory::Reorder)),
            PROJECT,
            &applier,
            &ExecutionContext {
                api_key: "k",
                model: "gpt-4o-mini",
                progress: &progress,
            },
        )
        .await;

    assert_eq!(result.failure, Some(FailureKind::Parse));
    assert!(result.new_order.is_empty());
}

#[tokio::test]
async fn test_model_declining_is_reported() {
    let mut transport = MockTransport::new();
    transport.expect_complete().returning(|_, _| {
        Ok(LlmReply::text(r#"{"success": false, "error": "Only one highlight exists."}"#))
    });
    let mut applier = MockApplier::new();
    applier.expect_apply().never();

    let agent = agent(transport, InMemoryStore::with_project(PROJECT, &["a"]));
    let progress = ProgressBroadcaster::silent();
    let result = agent
        .execute_summary(
            Some(confirmed(IntentCategory::ImproveConclusion)),
            PROJECT,
            &applier,
            &ExecutionContext {
                api_key: "k",
                model: "gpt-4o-mini",
                progress: &progress,
            },
        )
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Only one highlight exists."));
}

#[tokio::test]
async fn test_empty_project_fails_without_model_call() {
    let mut transport = MockTransport::new();
    transport.expect_complete().never();
    let mut applier = MockApplier::new();
    applier.expect_apply().never();

    let agent = agent(transport, InMemoryStore::default());
    let progress = ProgressBroadcaster::silent();
    let result = agent
        .execute_summary(
            Some(confirmed(IntentCategory::Reorder)),
            "empty",
            &applier,
            &ExecutionContext {
                api_key: "k",
                model: "gpt-4o-mini",
                progress: &progress,
            },
        )
        .await;
    assert_eq!(result.failure, Some(FailureKind::Validation));
}

#[tokio::test]
async fn test_transport_error_is_surfaced() {
    let mut transport = MockTransport::new();
    transport
        .expect_complete()
        .returning(|_, _| Err(MontageError::Transport("502 Bad Gateway".into())));
    let mut applier = MockApplier::new();
    applier.expect_apply().never();

    let agent = agent(transport, InMemoryStore::with_project(PROJECT, &["a", "b"]));
    let progress = ProgressBroadcaster::silent();
    let result = agent
        .execute_summary(
            Some(confirmed(IntentCategory::Reorder)),
            PROJECT,
            &applier,
            &ExecutionContext {
                api_key: "k",
                model: "gpt-4o-mini",
                progress: &progress,
            },
        )
        .await;
    assert_eq!(result.failure, Some(FailureKind::Transport));
    assert_eq!(agent.config().llm_timeout(), Duration::from_millis(200));
}
