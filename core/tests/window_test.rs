use montage_core::context::{create_counter, ContextWindowBuilder, TokenCounter};
use montage_core::{ChatMessage, MessageRole, ModelLimits};

const MODEL: &str = "window-test-model";

fn builder(limit: usize) -> ContextWindowBuilder {
    ContextWindowBuilder::new(create_counter(), ModelLimits::new().with_limit(MODEL, limit))
}

/// Alternating user/assistant messages of `chars` characters each
fn history(count: usize, chars: usize) -> Vec<ChatMessage> {
    (0..count)
        .map(|i| {
            let text = format!("{}{}", i, "m".repeat(chars.saturating_sub(1)));
            if i % 2 == 0 {
                ChatMessage::user(text)
            } else {
                ChatMessage::assistant(text)
            }
        })
        .collect()
}

#[test]
fn test_everything_fits() {
    // system 30 tokens, three history messages of 20, new message 10
    let system = "s".repeat(104);
    let new_message = "n".repeat(24);
    let window = builder(100).build(MODEL, &system, &history(3, 64), &new_message, 0);

    assert_eq!(window.messages.len(), 5);
    assert_eq!(window.trimmed_count, 0);
    assert!(window.summary.is_none());
    assert_eq!(window.total_tokens, 100);
    assert_eq!(window.messages[0].role, MessageRole::System);
    assert_eq!(window.messages[4].content, new_message);
}

#[test]
fn test_tight_limit_keeps_newest_and_summarizes() {
    // history messages cost 204 tokens each; only the newest fits next to system + new message
    let system = "s".repeat(104);
    let new_message = "n".repeat(24);
    let log = history(3, 800);
    let window = builder(400).build(MODEL, &system, &log, &new_message, 0);

    assert_eq!(window.trimmed_count, 2);
    let summary = window.summary.as_deref().unwrap();
    assert!(summary.starts_with("Summary of earlier conversation:"));
    assert!(summary.contains("- User asked: 0"));
    assert!(summary.contains("- Assistant replied: 1"));

    assert_eq!(window.messages.len(), 4);
    assert_eq!(window.messages[1].content, summary);
    assert_eq!(window.messages[2].id, log[2].id);
    assert!(window.total_tokens <= 400);
}

#[test]
fn test_reserve_shrinks_budget() {
    let window = builder(100).build(MODEL, &"s".repeat(104), &history(3, 64), "hello", 40);
    assert_eq!(window.budget, 60);
    assert!(window.total_tokens <= 60);
    assert!(window.trimmed_count > 0);
}

#[test]
fn test_unknown_model_uses_default_limit() {
    let b = ContextWindowBuilder::with_defaults();
    let window = b.build("some-new-model", "sys", &[], "hi", 192);
    assert_eq!(window.budget, 8_000);
}

#[test]
fn test_budget_invariant_and_chronology() {
    let counter = create_counter();
    for limit in (0..600).step_by(23) {
        for reserve in [0, 17, 64] {
            for (count, chars) in [(0, 0), (1, 30), (5, 90), (12, 250), (30, 8)] {
                let log = history(count, chars);
                let window = builder(limit).build(MODEL, &"p".repeat(150), &log, "what now?", reserve);
                let budget = limit.saturating_sub(reserve);

                assert!(
                    window.total_tokens <= budget,
                    "limit={limit} reserve={reserve} count={count}: {} > {budget}",
                    window.total_tokens
                );
                assert_eq!(counter.count_messages(&window.messages), window.total_tokens);

                // History messages keep their original relative order
                let positions: Vec<usize> = window
                    .messages
                    .iter()
                    .filter_map(|m| log.iter().position(|h| h.id == m.id))
                    .collect();
                assert!(positions.windows(2).all(|w| w[0] < w[1]));
                assert_eq!(positions.len() + window.trimmed_count, count);
            }
        }
    }
}
