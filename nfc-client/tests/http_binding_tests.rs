//! HTTP polling binding against a live nfc-mock

mod helpers;

use helpers::MockServer;
use nfc_client::service::{HttpModelService, ModelService, ServiceError};
use nfc_client::{Orchestrator, OrchestratorOptions};
use nfc_common::events::{EventBus, InferencePhase};
use nfc_mock::MockConfig;
use std::sync::Arc;
use std::time::Duration;

fn binding(server: &MockServer) -> HttpModelService {
    HttpModelService::new(
        server.api_url(),
        Duration::from_secs(5),
        Duration::from_millis(20),
    )
    .unwrap()
}

#[tokio::test]
async fn test_request_response_operations() {
    let server = MockServer::instant().await;
    let service = binding(&server);

    service.start_recording("grip").await.unwrap();
    assert_eq!(
        service.start_recording("fist").await,
        Err(ServiceError::Rejected("Recording already in progress".to_string()))
    );
    service.stop_recording().await.unwrap();

    let report = service.train().await.unwrap();
    assert_eq!(report.accuracy, Some(0.95));
    assert_eq!(report.features, vec!["grip".to_string()]);

    service.start_inference().await.unwrap();
    let status = service.status().await.unwrap();
    assert!(status.inference);
    assert!(status.model_trained);
    assert_eq!(status.latest_prediction.unwrap().feature, "grip");

    service.stop_inference().await.unwrap();
    let status = service.status().await.unwrap();
    assert!(!status.inference);
    assert!(status.latest_prediction.is_none());
}

#[tokio::test]
async fn test_error_envelope_message_is_verbatim() {
    let server = MockServer::instant().await;
    let service = binding(&server);

    assert_eq!(
        service.train().await.unwrap_err(),
        ServiceError::Rejected("No training data files found!".to_string())
    );
}

#[tokio::test]
async fn test_injected_failure() {
    let mut config = MockConfig::instant();
    config
        .failures
        .insert("start_recording".to_string(), "network down".to_string());
    let server = MockServer::start(config).await;

    let err = binding(&server).start_recording("grip").await.unwrap_err();
    assert_eq!(err.to_string(), "network down");
}

#[tokio::test]
async fn test_unknown_route_is_rejected_with_server_message() {
    let server = MockServer::instant().await;
    let service = HttpModelService::new(
        format!("http://{}/nope", server.addr),
        Duration::from_secs(5),
        Duration::from_millis(20),
    )
    .unwrap();

    assert_eq!(
        service.stop_recording().await,
        Err(ServiceError::Rejected("Route not found".to_string()))
    );
}

#[tokio::test]
async fn test_polling_feed_delivers_predictions() {
    let server = MockServer::instant().await;
    let service = binding(&server);
    service.start_recording("grip").await.unwrap();
    service.stop_recording().await.unwrap();
    service.train().await.unwrap();
    service.start_inference().await.unwrap();

    let mut feed = service.subscribe().await.unwrap();
    for _ in 0..2 {
        let item = tokio::time::timeout(Duration::from_secs(5), feed.recv())
            .await
            .expect("no prediction polled")
            .expect("feed ended");
        let prediction = item.unwrap();
        assert_eq!(prediction.feature, "grip");
    }
}

#[tokio::test]
async fn test_polling_feed_reports_unreachable_service() {
    let server = MockServer::instant().await;
    let service = binding(&server);
    drop(server);
    // Give the aborted listener a moment to close
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut feed = service.subscribe().await.unwrap();
    let item = tokio::time::timeout(Duration::from_secs(10), feed.recv())
        .await
        .expect("no item")
        .expect("feed ended without an error");
    assert!(matches!(item, Err(ServiceError::Transport(_))));
}

#[tokio::test]
async fn test_orchestrated_session_over_http() {
    let server = MockServer::instant().await;
    let service = Arc::new(binding(&server));
    let options = OrchestratorOptions {
        recording_secs: 1,
        ..OrchestratorOptions::default()
    };
    let mut orchestrator = Orchestrator::new(service, options, EventBus::default());

    orchestrator.add_feature("grip").unwrap();
    orchestrator.start_recording("grip").unwrap();
    orchestrator.settle().await;
    assert!(orchestrator.registry().is_calibrated("grip"));
    assert!(orchestrator.error().is_none());
    assert!(!server.state.store.read().await.is_recording());

    orchestrator.train().unwrap();
    orchestrator.settle().await;
    assert!(orchestrator.model_trained());

    orchestrator.toggle_inference().unwrap();
    orchestrator.settle().await;
    assert_eq!(orchestrator.inference_phase(), InferencePhase::Active);

    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.last_prediction().is_none() {
            orchestrator.step().await;
        }
    })
    .await
    .expect("no prediction reached the session");
    assert_eq!(orchestrator.last_prediction().unwrap().feature, "grip");

    orchestrator.toggle_inference().unwrap();
    orchestrator.settle().await;
    assert_eq!(orchestrator.inference_phase(), InferencePhase::Stopped);
    assert!(!server.state.store.read().await.inference_active());
}
