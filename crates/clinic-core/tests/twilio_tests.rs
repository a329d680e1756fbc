//! Twilio client against a mock Messages API.
//!
//! The client is blocking, so it is built, used and dropped inside
//! `spawn_blocking`.

use std::sync::Arc;

use clinic_core::config::TwilioConfig;
use clinic_core::notify::{
    DeliveryOutcome, DispatchKind, MemoryCommunicationLog, NotificationGateway, SmsError,
    SmsProvider, TwilioSmsProvider,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MESSAGES_PATH: &str = "/2010-04-01/Accounts/AC123/Messages.json";

fn twilio_config(api_base: String) -> TwilioConfig {
    TwilioConfig {
        account_sid: "AC123".to_string(),
        auth_token: "secret".to_string(),
        from_number: "+14155550000".to_string(),
        api_base,
    }
}

async fn send_via(server: &MockServer, to: &'static str) -> Result<String, SmsError> {
    let config = twilio_config(server.uri());
    tokio::task::spawn_blocking(move || {
        let provider = TwilioSmsProvider::new(&config)?;
        provider.send(to, "Your appointment is tomorrow")
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_send_returns_message_sid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(header_exists("authorization"))
        .and(body_string_contains("To=%2B14155550100"))
        .and(body_string_contains("From=%2B14155550000"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": "SM42",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sid = send_via(&server, "(415) 555-0100").await.unwrap();
    assert_eq!(sid, "SM42");
}

#[tokio::test]
async fn test_unverified_number_is_a_limitation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 21608,
            "message": concat!(
                "The number is unverified. ",
                "Trial accounts cannot send messages to unverified numbers"
            ),
            "status": 400
        })))
        .mount(&server)
        .await;

    let err = send_via(&server, "4155550100").await.unwrap_err();
    assert!(matches!(err, SmsError::Limited(_)), "{:?}", err);
}

#[tokio::test]
async fn test_provider_error_keeps_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 21211,
            "message": "Invalid 'To' Phone Number",
            "status": 400
        })))
        .mount(&server)
        .await;

    match send_via(&server, "4155550100").await {
        Err(SmsError::Provider { code, message }) => {
            assert_eq!(code, Some(21211));
            assert!(message.contains("Invalid"));
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    match send_via(&server, "4155550100").await {
        Err(SmsError::Provider { code, message }) => {
            assert_eq!(code, None);
            assert!(message.contains("503"));
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_gateway_logs_real_and_limited_sends() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(body_string_contains("To=%2B14155550100"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sid": "SM7" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(body_string_contains("To=%2B12125550199"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "code": 63038,
            "message": "Account exceeded the daily messages limit"
        })))
        .mount(&server)
        .await;

    let config = twilio_config(server.uri());
    let (outcomes, entries) = tokio::task::spawn_blocking(move || {
        let log = Arc::new(MemoryCommunicationLog::new());
        let provider = TwilioSmsProvider::new(&config).unwrap();
        let gateway = NotificationGateway::new(log.clone()).with_sms_provider(Box::new(provider));
        let outcomes = vec![
            gateway.send_sms("4155550100", "Reminder"),
            gateway.send_sms("2125550199", "Reminder"),
            gateway.send_sms("5551234567", "Reminder"),
        ];
        (outcomes, log.entries())
    })
    .await
    .unwrap();

    assert_eq!(outcomes[0], DeliveryOutcome::Delivered);
    assert!(matches!(outcomes[1], DeliveryOutcome::Degraded(_)));
    assert!(matches!(outcomes[2], DeliveryOutcome::Degraded(_)));

    let kinds: Vec<DispatchKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DispatchKind::Real,
            DispatchKind::SimulatedLimit,
            DispatchKind::Simulated
        ]
    );
    assert_eq!(entries[0].reference.as_deref(), Some("SM7"));

    // Placeholder numbers never reach the provider
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
}
