// Unit tests for the Anthropic provider and stream decoder

use converse_core::{
    ChatError, Content, Message, MessageRole, ProviderStream, StreamStatus, TokenUsage,
};
use futures::stream;

use crate::{AnthropicProvider, AnthropicStream};

fn fixture_stream(model: &str, body: &'static str) -> AnthropicStream {
    let bytes = stream::iter([Ok::<_, std::convert::Infallible>(body.as_bytes())]);
    AnthropicStream::from_sse(model, bytes)
}

async fn drain(decoder: &mut AnthropicStream) -> Vec<StreamStatus> {
    let mut statuses = Vec::new();
    while let Some(status) = decoder.next_status().await.expect("decode failed") {
        statuses.push(status);
    }
    statuses
}

const TEXT_FIXTURE: &str = "\
event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"role\":\"assistant\",\"usage\":{\"input_tokens\":10,\"output_tokens\":1}}}\n\n\
event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n\
event: ping\n\
data: {\"type\":\"ping\"}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello,\"}}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" world\"}}\n\n\
event: content_block_stop\n\
data: {\"type\":\"content_block_stop\",\"index\":0}\n\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":12}}\n\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";

const TOOL_FIXTURE: &str = "\
event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"role\":\"assistant\",\"usage\":{\"input_tokens\":25,\"output_tokens\":0}}}\n\n\
event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"search\",\"input\":{}}}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"query\\\":\"}}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"rust\\\"}\"}}\n\n\
event: content_block_stop\n\
data: {\"type\":\"content_block_stop\",\"index\":0}\n\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":30}}\n\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";

#[tokio::test]
async fn test_text_deltas_assemble_into_message() {
    let mut decoder = fixture_stream("claude-3-5-sonnet-20241022", TEXT_FIXTURE);

    let mut deltas = String::new();
    let mut statuses = Vec::new();
    while let Some(status) = decoder.next_status().await.unwrap() {
        if status == StreamStatus::Text {
            deltas.push_str(decoder.last_text());
        }
        statuses.push(status);
    }

    assert_eq!(statuses, vec![StreamStatus::Text, StreamStatus::Text]);
    assert_eq!(deltas, "Hello, world");

    let message = decoder.message().clone();
    assert_eq!(message.role, MessageRole::Assistant);
    assert_eq!(message.content, Content::from_text("Hello, world"));
    assert!(message.tool_calls.is_empty());
}

#[tokio::test]
async fn test_usage_reports_are_summed() {
    let mut decoder = fixture_stream("claude-3-5-sonnet-20241022", TEXT_FIXTURE);
    drain(&mut decoder).await;
    // message_start reported 10/1, message_delta added 0/12
    assert_eq!(
        decoder.usage(),
        TokenUsage {
            input_tokens: 10,
            output_tokens: 13
        }
    );
}

#[tokio::test]
async fn test_decoding_is_idempotent() {
    let mut first = fixture_stream("claude-3-5-sonnet-20241022", TEXT_FIXTURE);
    let mut second = fixture_stream("claude-3-5-sonnet-20241022", TEXT_FIXTURE);
    drain(&mut first).await;
    drain(&mut second).await;

    assert_eq!(first.usage(), second.usage());
    assert_eq!(
        Box::new(first).into_message(),
        Box::new(second).into_message()
    );
}

#[tokio::test]
async fn test_tool_call_argument_accumulation() {
    let mut decoder = fixture_stream("claude-3-5-sonnet-20241022", TOOL_FIXTURE);

    let statuses = drain(&mut decoder).await;
    assert_eq!(
        statuses,
        vec![
            StreamStatus::ToolCallBegin,
            StreamStatus::ToolCallData,
            StreamStatus::ToolCallData,
            StreamStatus::ToolCallReady,
        ]
    );

    let message = Box::new(decoder).into_message();
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].id, "toolu_1");
    assert_eq!(message.tool_calls[0].name, "search");
    // Byte concatenation of the argument deltas
    assert_eq!(message.tool_calls[0].arguments, r#"{"query":"rust"}"#);
}

#[tokio::test]
async fn test_abnormal_stop_reason_is_fatal() {
    let body = "\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"max_tokens\"},\"usage\":{\"output_tokens\":5}}\n\n";
    let mut decoder = fixture_stream("claude-3-5-sonnet-20241022", body);
    assert!(matches!(
        decoder.next_status().await,
        Err(ChatError::UnexpectedStop(reason)) if reason == "max_tokens"
    ));
}

#[tokio::test]
async fn test_error_event_is_fatal_and_sticky() {
    let body = "\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"partial\"}}\n\n\
event: error\n\
data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
    let mut decoder = fixture_stream("claude-3-5-sonnet-20241022", body);

    assert_eq!(
        decoder.next_status().await.unwrap(),
        Some(StreamStatus::Text)
    );
    assert!(matches!(
        decoder.next_status().await,
        Err(ChatError::Decode(message)) if message.contains("overloaded_error")
    ));
    assert!(decoder.next_status().await.is_err());
    // The partial message is still inspectable
    assert_eq!(decoder.message().content.text(), "partial");
}

#[tokio::test]
async fn test_argument_delta_without_open_call_is_fatal() {
    let body = "\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{}\"}}\n\n";
    let mut decoder = fixture_stream("claude-3-5-sonnet-20241022", body);
    assert!(matches!(
        decoder.next_status().await,
        Err(ChatError::Decode(_))
    ));
}

#[tokio::test]
async fn test_unknown_events_are_skipped() {
    let body = "\
event: content_block_heartbeat\n\
data: {\"type\":\"content_block_heartbeat\"}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}\n\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";
    let mut decoder = fixture_stream("claude-3-5-sonnet-20241022", body);
    let statuses = drain(&mut decoder).await;
    assert_eq!(statuses, vec![StreamStatus::Text]);
    assert_eq!(decoder.message().content.text(), "ok");
}

#[tokio::test]
async fn test_cost_uses_prefix_pricing() {
    let mut decoder = fixture_stream("claude-3-5-sonnet-20241022", TEXT_FIXTURE);
    drain(&mut decoder).await;
    // 10 input at $3.00/M + 13 output at $15.00/M, via the
    // claude-3-5-sonnet prefix
    let expected = 10.0 * 3.00 / 1e6 + 13.0 * 15.00 / 1e6;
    assert!((decoder.cost_usd() - expected).abs() < 1e-12);

    let mut unknown = fixture_stream("claude-9000", TEXT_FIXTURE);
    drain(&mut unknown).await;
    assert_eq!(unknown.cost_usd(), 0.0);
}

mod provider {
    use super::*;
    use converse_core::Provider;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_generate_decodes_streamed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "claude-3-5-sonnet-20241022",
                "stream": true,
                "max_tokens": 4096
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(TEXT_FIXTURE, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", "claude-3-5-sonnet-20241022")
            .with_base_url(format!("{}/v1/messages", server.uri()));

        let history = vec![Message::user("Hi")];
        let mut decoder = provider
            .generate(None, &history, None)
            .await
            .expect("generate failed");

        let mut text = String::new();
        while let Some(status) = decoder.next_status().await.unwrap() {
            if status == StreamStatus::Text {
                text.push_str(decoder.last_text());
            }
        }
        assert_eq!(text, "Hello, world");
    }

    #[tokio::test]
    async fn test_generate_surfaces_http_errors_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", "claude-3-5-sonnet-20241022")
            .with_base_url(format!("{}/v1/messages", server.uri()));

        let history = vec![Message::user("Hi")];
        let result = provider.generate(None, &history, None).await;
        match result {
            Err(ChatError::Provider(message)) => {
                assert!(message.contains("529"), "unexpected message: {message}");
            }
            other => panic!("expected a provider error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_provider_debug_redacts_key() {
        let provider = AnthropicProvider::new("secret", "claude-3-5-haiku-20241022");
        let debug = format!("{provider:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret"));
    }
}

mod conversion {
    use super::*;
    use crate::provider::convert_items;
    use serde_json::json;

    #[test]
    fn test_blank_text_becomes_placeholder() {
        let blocks = convert_items(&Content::from_text("   "));
        let value = serde_json::to_value(&blocks).unwrap();
        assert_eq!(value, json!([{"type": "text", "text": "(Empty)"}]));
    }

    #[test]
    fn test_data_url_becomes_base64_source() {
        let mut content = Content::new();
        content.add_image("data:image/png;base64,AAAA");
        let value = serde_json::to_value(convert_items(&content)).unwrap();
        assert_eq!(
            value,
            json!([{
                "type": "image",
                "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}
            }])
        );
    }

    #[test]
    fn test_plain_url_becomes_url_source() {
        let mut content = Content::new();
        content.add_image("https://example.com/image.jpg");
        let value = serde_json::to_value(convert_items(&content)).unwrap();
        assert_eq!(
            value,
            json!([{
                "type": "image",
                "source": {"type": "url", "url": "https://example.com/image.jpg"}
            }])
        );
    }
}
