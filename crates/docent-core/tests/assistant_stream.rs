use std::time::Duration;

use docent_core::{
    Assistant, ChatClient, CompletionState, DocumentSection, LiveMessage, RemoteEmbedder, Turn,
    VectorIndex,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": content}}]})
    )
}

fn fixture_index() -> VectorIndex {
    let section = |title: &str, text: &str, embedding: [f32; 4]| DocumentSection {
        title: title.into(),
        text: text.into(),
        embedding: embedding.to_vec(),
    };
    VectorIndex::build(vec![
        section("XSML", "XSML is the markup language of JSAR.", [1.0, 0.0, 0.0, 0.0]),
        section("SCSS", "Spatial stylesheets.", [0.0, 1.0, 0.0, 0.0]),
        section("Playground", "Try JSAR in the browser.", [0.0, 0.0, 1.0, 0.0]),
    ])
    .unwrap()
}

async fn mount_embeddings(server: &MockServer, query: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v1/embeddings"))
        .and(query_param("input", query))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": [0.9, 0.1, 0.0, 0.0]}]
        })))
        .mount(server)
        .await;
}

async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

fn assistant(server: &MockServer) -> Assistant {
    let timeout = Duration::from_secs(5);
    let embedder = RemoteEmbedder::new(&server.uri(), timeout).unwrap();
    let chat = ChatClient::new(&server.uri(), "test-model", timeout, timeout).unwrap();
    Assistant::new(embedder, chat).with_index(fixture_index())
}

/// Completion endpoint that sends `first` as one chunk and then holds the connection open.
async fn stalling_completion(first: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !String::from_utf8_lossy(&request).contains("\"stream\":true") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        let chunk = format!("{:x}\r\n{}\r\n", first.len(), first);
        if socket.write_all(head.as_bytes()).await.is_err()
            || socket.write_all(chunk.as_bytes()).await.is_err()
        {
            return;
        }
        let _ = socket.flush().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    format!("http://{addr}")
}

async fn stalling_assistant(server: &MockServer, idle_timeout: Duration) -> Assistant {
    let chat_base = stalling_completion(frame("partial ")).await;
    let embedder = RemoteEmbedder::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let chat = ChatClient::new(&chat_base, "test-model", Duration::from_secs(5), idle_timeout).unwrap();
    Assistant::new(embedder, chat).with_index(fixture_index())
}

#[tokio::test]
async fn question_is_answered_from_streamed_frames() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "what is XSML?").await;
    mount_stream(
        &server,
        format!(
            "{}{}data: [DONE]\n\n",
            frame("XSML is "),
            frame("a markup language.")
        ),
    )
    .await;

    let mut assistant = assistant(&server);
    let mut updates: Vec<(LiveMessage, CompletionState)> = Vec::new();
    let outcome = assistant
        .ask(
            "what is XSML?",
            "Manual > XSML",
            CancellationToken::new(),
            |live, state| updates.push((live.clone(), state)),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.state, CompletionState::Completed);
    assert_eq!(outcome.answer.as_deref(), Some("XSML is a markup language."));
    assert_eq!(outcome.sources.len(), 3);
    assert_eq!(outcome.sources[0].section.title, "XSML");

    let turns = assistant.conversation().turns();
    assert_eq!(turns.len(), 3);
    let Turn::User { query, content } = &turns[1] else {
        panic!("expected user turn, got {:?}", turns[1]);
    };
    assert_eq!(query, "what is XSML?");
    assert!(content.contains("Question: what is XSML?"));
    for (title, text) in [
        ("XSML", "XSML is the markup language of JSAR."),
        ("SCSS", "Spatial stylesheets."),
        ("Playground", "Try JSAR in the browser."),
    ] {
        assert!(content.contains(&format!("Title: {title}\nText: {text}")));
    }
    assert!(content.contains("Current reading content: Manual > XSML"));
    assert_eq!(
        turns[2],
        Turn::Assistant {
            content: "XSML is a markup language.".into()
        }
    );

    assert!(assistant.live().is_none());
    assert!(!assistant.is_pending());
    assert_eq!(updates.first().map(|u| u.1), Some(CompletionState::StreamOpen));
    assert_eq!(
        updates.last().map(|u| u.0.final_response.as_str()),
        Some("XSML is a markup language.")
    );

    let requests = server.received_requests().await.unwrap();
    let completion = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/chat/completions")
        .unwrap();
    let body: serde_json::Value = completion.body_json().unwrap();
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert!(body["messages"][1]["content"]
        .as_str()
        .unwrap()
        .contains("Question: what is XSML?"));
}

#[tokio::test]
async fn empty_frames_add_nothing_and_never_flip_to_thinking() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    mount_stream(
        &server,
        format!(
            "{}data: {{\"choices\":[{{\"delta\":{{}}}}]}}\n\n{}data: [DONE]\n\n",
            frame("A"),
            frame("B")
        ),
    )
    .await;

    let mut assistant = assistant(&server);
    let mut thinking = Vec::new();
    let outcome = assistant
        .ask("q", "", CancellationToken::new(), |live, _| {
            thinking.push(live.thinking)
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.answer.as_deref(), Some("AB"));
    assert!(thinking.iter().all(|t| !t));
}

#[tokio::test]
async fn malformed_frame_is_skipped() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    mount_stream(
        &server,
        format!("{}data: {{bad json\n\n{}data: [DONE]\n\n", frame("first "), frame("second")),
    )
    .await;

    let mut assistant = assistant(&server);
    let outcome = assistant
        .ask("q", "", CancellationToken::new(), |_, _| {})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.state, CompletionState::Completed);
    assert_eq!(outcome.answer.as_deref(), Some("first second"));
}

#[tokio::test]
async fn stream_closed_without_done_still_promotes() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    mount_stream(&server, format!("{}{}", frame("partial "), frame("answer"))).await;

    let mut assistant = assistant(&server);
    let outcome = assistant
        .ask("q", "", CancellationToken::new(), |_, _| {})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.state, CompletionState::Completed);
    assert_eq!(
        assistant.conversation().last(),
        Some(&Turn::Assistant {
            content: "partial answer".into()
        })
    );
}

#[tokio::test]
async fn reasoning_deltas_are_kept_apart_from_the_answer() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    mount_stream(
        &server,
        format!(
            "data: {}\n\n{}data: [DONE]\n\n",
            serde_json::json!({"choices": [{"delta": {"reasoning_content": "checking docs"}}]}),
            frame("Done.")
        ),
    )
    .await;

    let mut assistant = assistant(&server);
    let mut states = Vec::new();
    let mut reasoning = String::new();
    assistant
        .ask("q", "", CancellationToken::new(), |live, state| {
            states.push(state);
            reasoning = live.reasoning_activities.clone();
        })
        .await
        .unwrap();

    assert_eq!(
        states,
        vec![
            CompletionState::StreamOpen,
            CompletionState::Reasoning,
            CompletionState::Responding
        ]
    );
    assert_eq!(reasoning, "checking docs");
    assert_eq!(
        assistant.conversation().last(),
        Some(&Turn::Assistant {
            content: "Done.".into()
        })
    );
}

#[tokio::test]
async fn server_error_becomes_visible_error_turn() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let mut assistant = assistant(&server);
    let outcome = assistant
        .ask("q", "", CancellationToken::new(), |_, _| {})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.state, CompletionState::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("502"));
    assert!(matches!(
        assistant.conversation().last(),
        Some(Turn::Error { .. })
    ));
    // Error turns are not sent back to the model.
    let turns = assistant.conversation().turns();
    let messages = assistant.conversation().to_request_messages();
    assert_eq!(turns.len(), 3);
    assert_eq!(
        messages.iter().map(|m| m.role).collect::<Vec<_>>(),
        vec!["system", "user"]
    );
    assert!(messages
        .iter()
        .all(|m| !m.content.contains("502") && !m.content.contains("bad gateway")));
    assert!(!assistant.is_pending());
}

#[tokio::test]
async fn failed_retrieval_leaves_no_empty_user_message_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/embeddings"))
        .and(query_param("input", "broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;
    mount_embeddings(&server, "what is XSML?").await;
    mount_stream(&server, format!("{}data: [DONE]\n\n", frame("ok"))).await;

    let mut assistant = assistant(&server);
    let first = assistant
        .ask("broken", "", CancellationToken::new(), |_, _| {})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.state, CompletionState::Failed);

    let second = assistant
        .ask("what is XSML?", "", CancellationToken::new(), |_, _| {})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.state, CompletionState::Completed);

    let requests = server.received_requests().await.unwrap();
    let completions: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/v1/chat/completions")
        .collect();
    assert_eq!(completions.len(), 1);
    let body: serde_json::Value = completions[0].body_json().unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["role"], "user");
    assert!(messages[1]["content"]
        .as_str()
        .unwrap()
        .contains("Question: what is XSML?"));
    assert!(messages
        .iter()
        .all(|m| !m["content"].as_str().unwrap_or_default().is_empty()));
}

#[tokio::test]
async fn slow_completion_times_out() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(frame("late"), "text/event-stream")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let embedder = RemoteEmbedder::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let chat = ChatClient::new(
        &server.uri(),
        "test-model",
        Duration::from_millis(100),
        Duration::from_millis(100),
    )
    .unwrap();
    let mut assistant = Assistant::new(embedder, chat).with_index(fixture_index());
    let outcome = assistant
        .ask("q", "", CancellationToken::new(), |_, _| {})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.state, CompletionState::Failed);
    assert!(outcome.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn stream_stalling_after_partial_answer_keeps_it_and_adds_error() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    let mut assistant = stalling_assistant(&server, Duration::from_millis(200)).await;

    let outcome = assistant
        .ask("q", "", CancellationToken::new(), |_, _| {})
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.state, CompletionState::Failed);
    assert_eq!(outcome.answer.as_deref(), Some("partial "));
    assert!(outcome.error.unwrap().contains("timed out"));
    let turns = assistant.conversation().turns();
    assert_eq!(turns.len(), 4);
    assert!(matches!(&turns[1], Turn::User { .. }));
    assert_eq!(
        turns[2],
        Turn::Assistant {
            content: "partial ".into()
        }
    );
    assert!(matches!(&turns[3], Turn::Error { .. }));
    assert!(!assistant.is_pending());
    assert!(assistant.live().is_none());
}

#[tokio::test]
async fn cancelling_mid_answer_keeps_partial_text() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    let mut assistant = stalling_assistant(&server, Duration::from_secs(5)).await;

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        assistant.ask("q", "", cancel, |live, _| {
            if !live.final_response.is_empty() {
                stop.cancel();
            }
        }),
    )
    .await
    .expect("cancel should end the stream promptly")
    .unwrap()
    .unwrap();

    assert_eq!(outcome.state, CompletionState::Cancelled);
    assert_eq!(outcome.answer.as_deref(), Some("partial "));
    assert!(outcome.error.is_none());
    assert_eq!(
        assistant.conversation().last(),
        Some(&Turn::Assistant {
            content: "partial ".into()
        })
    );
    assert_eq!(assistant.conversation().len(), 3);
    assert!(!assistant.is_pending());
    assert!(assistant.begin("next").unwrap().is_some());
}

#[tokio::test]
async fn clear_after_several_questions_leaves_system_turn() {
    let server = MockServer::start().await;
    mount_embeddings(&server, "q").await;
    mount_stream(&server, format!("{}data: [DONE]\n\n", frame("ok"))).await;

    let mut assistant = assistant(&server);
    for _ in 0..3 {
        assistant
            .ask("q", "", CancellationToken::new(), |_, _| {})
            .await
            .unwrap();
    }
    assert_eq!(assistant.conversation().len(), 7);
    assistant.clear().unwrap();
    assert_eq!(assistant.conversation().len(), 1);
    assert!(matches!(
        assistant.conversation().turns()[0],
        Turn::System { .. }
    ));
}
