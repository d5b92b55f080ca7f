use std::sync::Arc;

use futures::StreamExt;
use httpmock::prelude::*;
use parley_runtime::{
    ChatRequest, ContentBlock, HttpTransport, HttpTransportConfig, ImageSource, Message, Session,
    SessionConfig, SessionOutcome, ToolRegistry, Transport, WireMode,
};
use serde_json::json;

fn transport(server: &MockServer, mode: WireMode) -> HttpTransport {
    HttpTransport::new(
        HttpTransportConfig::default()
            .with_endpoint(&server.url("/api/chat"))
            .with_mode(mode),
    )
    .unwrap()
}

#[tokio::test]
async fn test_streams_body_with_mode_accept_header() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/chat")
                .header("accept", "application/x-ndjson")
                .json_body_includes(r#"{"stream": true}"#);
            then.status(200)
                .header("content-type", "application/x-ndjson")
                .body("{\"response\":\"Hi\"}\n{\"response\":\"!\"}\n");
        })
        .await;

    let transport = transport(&server, WireMode::Lines);
    let request = ChatRequest::initial(None, vec![Message::user("hello")], vec![]);
    let mut body = transport.open(&request).await.unwrap();

    let mut raw = Vec::new();
    while let Some(chunk) = body.next().await {
        raw.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(
        String::from_utf8(raw).unwrap(),
        "{\"response\":\"Hi\"}\n{\"response\":\"!\"}\n"
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_non_success_status_carries_code_and_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(404).body("model \"nope\" not found");
        })
        .await;

    let transport = transport(&server, WireMode::EventBlocks);
    let request = ChatRequest::initial(Some("nope".into()), vec![Message::user("hi")], vec![]);
    let err = transport.open(&request).await.err().unwrap();

    assert_eq!(err.status_code(), Some(404));
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_remote_images_are_inlined_before_sending() {
    let server = MockServer::start_async().await;
    let image = server
        .mock_async(|when, then| {
            when.method(GET).path("/outfit.png");
            then.status(200)
                .header("content-type", "image/png")
                .body("abc");
        })
        .await;
    let chat = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/chat")
                .json_body_includes(
                    json!({"messages": [{"role": "user", "content": "Rate this", "images": ["YWJj"]}]})
                        .to_string(),
                );
            then.status(200).body("");
        })
        .await;

    let transport = transport(&server, WireMode::Lines);
    let request = ChatRequest::initial(
        None,
        vec![Message::user_blocks(vec![
            ContentBlock::Image {
                source: ImageSource::Url {
                    url: server.url("/outfit.png"),
                },
            },
            ContentBlock::Text {
                text: "Rate this".into(),
            },
        ])],
        vec![],
    );
    transport.open(&request).await.unwrap();

    image.assert_async().await;
    chat.assert_async().await;
}

#[tokio::test]
async fn test_session_over_http_event_blocks() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(200).body(concat!(
                ": keep-alive\n\n",
                "event: message\r\ndata: {\"model\":\"llama3.2\",\"createdAt\":\"2026-10-19T12:00:00Z\",\"message\":{\"role\":\"assistant\",\"content\":\"Looks \"}}\r\n\r\n",
                "event: message\ndata: {\"message\":{\"role\":\"assistant\",\"content\":\"great\"}}\n\n",
            ));
        })
        .await;

    let session = Session::new(
        Arc::new(ToolRegistry::new()),
        Arc::new(transport(&server, WireMode::EventBlocks)),
        SessionConfig::default().with_model("llama3.2"),
    );
    let outcome = session
        .submit_text("How do I look?")
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::Completed {
            text: "Looks great".into()
        }
    );
}
