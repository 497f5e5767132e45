//! Operator commands routed through the service command handler.

mod common;

use common::{RecordingService, TestNode};
use watchkeeper_common::{ServiceCommand, ServiceRequest, ServiceState, WatcherError};
use watchkeeper_coordinator::{LifecycleConfig, ManagedService, ServiceCommandHandler};

fn master_node() -> TestNode {
    TestNode::new(LifecycleConfig::default(), RecordingService::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_then_start_commands() {
    let node = master_node();
    node.apply(true, true).await;
    let handler = ServiceCommandHandler::new(node.coordinator.clone());

    let response = handler.handle(&ServiceRequest::new().stop()).await.unwrap();
    assert!(response.acknowledged);
    assert_eq!(response.command, ServiceCommand::Stop);
    assert_eq!(response.state, ServiceState::Stopped);
    assert!(node.coordinator.is_manually_stopped());

    let response = handler.handle(&ServiceRequest::new().start()).await.unwrap();
    assert_eq!(response.state, ServiceState::Started);
    assert!(!node.coordinator.is_manually_stopped());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_cycles_running_service() {
    let node = master_node();
    node.apply(true, true).await;
    let handler = ServiceCommandHandler::new(node.coordinator.clone());

    let response = handler.handle(&ServiceRequest::new().restart()).await.unwrap();

    assert_eq!(response.state, ServiceState::Started);
    assert!(!node.coordinator.is_manually_stopped());
    assert_eq!(node.service.starts(), 2);
    assert_eq!(node.service.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_recovers_from_operator_stop() {
    let node = master_node();
    node.apply(true, true).await;
    node.coordinator.stop().await;
    let handler = ServiceCommandHandler::new(node.coordinator.clone());

    let response = handler.handle(&ServiceRequest::new().restart()).await.unwrap();

    assert_eq!(response.state, ServiceState::Started);
    assert_eq!(node.service.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_on_non_master_node() {
    let node = master_node();
    node.apply(false, true).await;
    let handler = ServiceCommandHandler::new(node.coordinator.clone());

    let err = handler.handle(&ServiceRequest::new().start()).await.unwrap_err();

    assert!(matches!(err, WatcherError::NotCoordinatingNode { .. }));
    assert_eq!(node.service.state(), ServiceState::Stopped);
    assert_eq!(node.service.starts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_without_command() {
    let node = master_node();
    node.apply(true, true).await;
    let handler = ServiceCommandHandler::new(node.coordinator.clone());

    let err = handler.handle(&ServiceRequest::new()).await.unwrap_err();

    assert_eq!(err.error_code(), "INVALID_REQUEST");
    assert_eq!(node.service.state(), ServiceState::Started);
}
