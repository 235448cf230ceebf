//! End-to-end stream behavior over mock collaborators: event ordering,
//! citation invariants, fallback, failure paths, and session
//! persistence.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use bookbuddy::pipeline::ChatStream;
use bookbuddy::types::{AgentEvent, AttributedEvent, Citation};
use common::{harness, harness_with_chat, harness_with_down_index, ScriptedChat};

async fn drain(stream: &mut ChatStream) -> Vec<AttributedEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.events.recv().await {
        let terminal = event.event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    events
}

fn texts(events: &[AttributedEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match &e.event {
            AgentEvent::Text { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

fn citations(events: &[AttributedEvent]) -> Vec<Citation> {
    events
        .iter()
        .filter_map(|e| match &e.event {
            AgentEvent::Source { citation } => Some(citation.clone()),
            _ => None,
        })
        .collect()
}

fn terminal_count(events: &[AttributedEvent]) -> usize {
    events.iter().filter(|e| e.event.is_terminal()).count()
}

#[tokio::test]
async fn test_glossary_stream_happy_path() {
    let harness = harness();
    let mut stream =
        harness.pipeline.chat_stream("What is a topic in ROS 2?", None, None);
    let events = drain(&mut stream).await;

    assert!(!texts(&events).is_empty());

    let sources = citations(&events);
    assert!(!sources.is_empty());
    assert!(sources.iter().any(|c| c.source.contains("module1-ros2")));

    // Exactly one terminal event, and it is last
    assert_eq!(terminal_count(&events), 1);
    match &events.last().unwrap().event {
        AgentEvent::End { agent } => assert_eq!(agent, "glossary"),
        other => panic!("expected end, got {other:?}"),
    }
}

#[tokio::test]
async fn test_citation_indices_are_dense() {
    let harness = harness();
    let mut stream =
        harness.pipeline.chat_stream("What is a topic in ROS 2?", None, None);
    let events = drain(&mut stream).await;

    let indices: Vec<usize> = citations(&events).iter().map(|c| c.index).collect();
    let expected: Vec<usize> = (1..=indices.len()).collect();
    assert_eq!(indices, expected);
}

#[tokio::test]
async fn test_inline_markers_reference_emitted_citations() {
    let harness = harness();
    let mut stream =
        harness.pipeline.chat_stream("What is a topic in ROS 2?", None, None);
    let events = drain(&mut stream).await;

    let text = texts(&events);
    let citation_count = citations(&events).len();
    let marker_re = regex::Regex::new(r"\[Source (\d+)\]").unwrap();
    for caps in marker_re.captures_iter(&text) {
        let index: usize = caps[1].parse().unwrap();
        assert!(index >= 1 && index <= citation_count, "dangling marker [Source {index}]");
    }
}

#[tokio::test]
async fn test_empty_query_rejected_without_agent_work() {
    let harness = harness();
    let mut stream = harness.pipeline.chat_stream("", None, None);
    let events = drain(&mut stream).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].event, AgentEvent::Error { .. }));
    assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_over_budget_query_rejected() {
    let harness = harness();
    let long = "a".repeat(2001);
    let mut stream = harness.pipeline.chat_stream(&long, None, None);
    let events = drain(&mut stream).await;

    assert_eq!(events.len(), 1);
    match &events[0].event {
        AgentEvent::Error { message } => assert!(message.contains("2000")),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(harness.chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_short_selected_text_rejected() {
    let harness = harness();
    let mut stream = harness.pipeline.chat_stream(
        "What is a topic?",
        None,
        Some("short".to_string()),
    );
    let events = drain(&mut stream).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].event, AgentEvent::Error { .. }));
}

#[tokio::test]
async fn test_off_topic_query_ends_via_fallback_agent() {
    let harness = harness();
    let mut stream =
        harness.pipeline.chat_stream("What is the recipe for chocolate cake?", None, None);
    let events = drain(&mut stream).await;

    // Not an error: the fallback agent answers normally
    match &events.last().unwrap().event {
        AgentEvent::End { agent } => assert_eq!(agent, "book"),
        other => panic!("expected end, got {other:?}"),
    }
}

#[tokio::test]
async fn test_multi_domain_synthesis() {
    let harness = harness();
    let mut stream = harness.pipeline.chat_stream(
        "What sensors does Isaac use and what hardware do they require?",
        None,
        None,
    );
    let events = drain(&mut stream).await;

    let text = texts(&events);
    assert!(text.contains("**Module Info Perspective:**"), "missing module section: {text}");
    assert!(text.contains("**Hardware Perspective:**"), "missing hardware section: {text}");

    // Merged citations are deduplicated by (source, section) and dense
    let sources = citations(&events);
    let mut keys: Vec<(String, Option<String>)> =
        sources.iter().map(|c| c.dedup_key()).collect();
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total, "duplicate citations after merge");

    let indices: Vec<usize> = sources.iter().map(|c| c.index).collect();
    let expected: Vec<usize> = (1..=indices.len()).collect();
    assert_eq!(indices, expected);

    assert_eq!(terminal_count(&events), 1);
    match &events.last().unwrap().event {
        AgentEvent::End { agent } => assert_eq!(agent, "module_info"),
        other => panic!("expected end, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_messages_persisted_in_turn_order() {
    let harness = harness();
    let session = "sess-persist".to_string();
    let (response, session_id) = harness
        .pipeline
        .chat("What is a topic in ROS 2?", Some(session.clone()), None)
        .await
        .unwrap();
    assert_eq!(session_id, session);
    assert!(!response.response.is_empty());

    let history = harness.sessions.get_history(&session, None).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, bookbuddy::types::Role::User);
    assert_eq!(history[1].role, bookbuddy::types::Role::Assistant);
    assert_eq!(history[1].agent_name.as_deref(), Some("glossary"));
}

#[tokio::test]
async fn test_client_disconnect_discards_partial_answer() {
    let harness = harness_with_chat(
        ScriptedChat::answer_with_citation().with_token_delay(Duration::from_millis(50)),
    );
    let session = "sess-disconnect".to_string();
    let mut stream = harness.pipeline.chat_stream(
        "What is a topic in ROS 2?",
        Some(session.clone()),
        None,
    );

    // Read one event, then go away
    let first = stream.events.recv().await.expect("first event");
    assert!(matches!(first.event, AgentEvent::Text { .. }));
    drop(stream);

    tokio::time::sleep(Duration::from_millis(400)).await;

    let history = harness.sessions.get_history(&session, None).await;
    assert_eq!(history.len(), 1, "assistant message must not be persisted on disconnect");
    assert_eq!(history[0].role, bookbuddy::types::Role::User);
}

#[tokio::test]
async fn test_retrieval_failure_surfaces_error_without_persistence() {
    let (pipeline, sessions) = harness_with_down_index();
    let session = "sess-down".to_string();
    let mut stream =
        pipeline.chat_stream("What is a topic in ROS 2?", Some(session.clone()), None);
    let events = drain(&mut stream).await;

    assert_eq!(terminal_count(&events), 1);
    match &events.last().unwrap().event {
        AgentEvent::Error { message } => {
            // Domain-agnostic user message, no implementation detail
            assert!(!message.contains("connection refused"));
        }
        other => panic!("expected error, got {other:?}"),
    }

    let history = sessions.get_history(&session, None).await;
    assert_eq!(history.len(), 1, "only the user message is persisted on failure");
}

#[tokio::test]
async fn test_direct_agent_chat_bypasses_router() {
    let harness = harness();
    // A hardware-flavored query sent straight to the glossary agent
    let mut stream = harness
        .pipeline
        .agent_chat_stream("glossary", "What GPU do I need?", None, None)
        .unwrap();
    let events = drain(&mut stream).await;
    match &events.last().unwrap().event {
        AgentEvent::End { agent } => assert_eq!(agent, "glossary"),
        other => panic!("expected end, got {other:?}"),
    }
}

#[tokio::test]
async fn test_direct_agent_chat_unknown_agent() {
    let harness = harness();
    let result = harness.pipeline.agent_chat_stream("astrology", "What is a topic?", None, None);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_capstone_prompt_orders_pipeline_stages() {
    let harness = harness();
    let mut stream = harness.pipeline.chat_stream("capstone milestones", None, None);
    drain(&mut stream).await;

    let requests = harness.chat.requests.lock().await;
    let request = requests.first().expect("capstone agent issued a completion");
    let system = &request.system;
    let voice = system.find("Voice Command").expect("voice stage");
    let plan = system.find("Path Planning").expect("plan stage");
    let navigate = system.find("Navigation").expect("navigate stage");
    let manipulate = system.find("Manipulation").expect("manipulate stage");
    assert!(voice < plan && plan < navigate && navigate < manipulate);
    assert!(request.user.contains("capstone milestones"));
}

#[tokio::test]
async fn test_history_window_injected_into_prompt() {
    let harness = harness();
    let session = "sess-history".to_string();
    harness
        .sessions
        .save_message(&session, bookbuddy::types::SessionMessage::user("What is a node?"))
        .await;
    harness
        .sessions
        .save_message(
            &session,
            bookbuddy::types::SessionMessage::assistant("A node is a process.", "glossary"),
        )
        .await;

    let mut stream = harness.pipeline.chat_stream(
        "What is a topic in ROS 2?",
        Some(session),
        None,
    );
    drain(&mut stream).await;

    let requests = harness.chat.requests.lock().await;
    let request = requests.first().expect("completion issued");
    assert_eq!(request.history.len(), 2);
    assert_eq!(request.history[0].content, "What is a node?");
}
