use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use master_dispatcher::{
    DispatchRole, MasterDispatchService, MasterService, Registry, ReportOutcome, SlaveEvent,
};
use master_errors::MasterError;
use master_testing_utils::{
    raw_options, RecordingReplyHandler, RecordingTransport, ReportBuilder, TaskMessageBuilder,
    TestEnv,
};

fn service_with_roles(roles: &[&str]) -> Arc<MasterService> {
    let mut registry = Registry::new(raw_options());
    for name in roles {
        registry.add_role(DispatchRole::new(*name)).unwrap();
    }
    Arc::new(MasterService::new(registry, 16))
}

fn spawn_run(
    service: &Arc<MasterService>,
) -> (
    broadcast::Sender<()>,
    tokio::task::JoinHandle<master_errors::MasterResult<()>>,
) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = Arc::clone(service);
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });
    (shutdown_tx, handle)
}

#[tokio::test]
async fn test_dispatch_and_report_through_service() {
    let service = service_with_roles(&["video"]);
    let transport = RecordingTransport::new();
    let slave = service
        .connect_slave("node-a".to_string(), Arc::new(transport.clone()))
        .await;

    let dispatched = service
        .dispatch("video", TaskMessageBuilder::new().build())
        .await
        .unwrap();
    assert_eq!(dispatched.slave, slave);
    assert_eq!(transport.count(), 1);

    let payload = ReportBuilder::new(dispatched.uid).to_json();
    let outcome = service.handle_report(slave, &payload).await.unwrap();
    assert!(matches!(outcome, ReportOutcome::Completed { .. }));

    let snapshot = service.snapshot().await;
    assert_eq!(snapshot.completed_total, 1);
    assert_eq!(snapshot.in_flight_total(), 0);
}

#[tokio::test]
async fn test_run_drains_mailbox_until_shutdown() {
    let service = service_with_roles(&["video"]);
    let slave = service
        .connect_slave("node-a".to_string(), Arc::new(RecordingTransport::new()))
        .await;
    let uid = service
        .dispatch("video", TaskMessageBuilder::new().build())
        .await
        .unwrap()
        .uid;

    let (shutdown_tx, handle) = spawn_run(&service);
    let events = service.event_sender();
    events
        .send(SlaveEvent::Report {
            slave,
            payload: "{broken".to_string(),
        })
        .await
        .unwrap();
    events
        .send(SlaveEvent::Report {
            slave,
            payload: ReportBuilder::new(uid).to_json(),
        })
        .await
        .unwrap();

    let completed = TestEnv::wait_for(
        || {
            let service = Arc::clone(&service);
            async move { service.snapshot().await.completed_total == 1 }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(completed);

    shutdown_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_disconnect_event_triggers_failover() {
    let service = service_with_roles(&["video"]);
    let s1 = service
        .connect_slave("s1".to_string(), Arc::new(RecordingTransport::new()))
        .await;
    service
        .dispatch("video", TaskMessageBuilder::new().build())
        .await
        .unwrap();

    let (shutdown_tx, handle) = spawn_run(&service);
    service
        .event_sender()
        .send(SlaveEvent::Disconnected { slave: s1 })
        .await
        .unwrap();

    let orphaned = TestEnv::wait_for(
        || {
            let service = Arc::clone(&service);
            async move { service.snapshot().await.orphaned == 1 }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(orphaned);

    let s2_transport = RecordingTransport::new();
    service
        .connect_slave("s2".to_string(), Arc::new(s2_transport.clone()))
        .await;
    assert_eq!(s2_transport.uids(), vec![1]);
    assert_eq!(service.snapshot().await.orphaned, 0);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reply_event_reaches_role_handler() {
    let handler = RecordingReplyHandler::new();
    let mut registry = Registry::new(raw_options());
    registry
        .add_role(DispatchRole::new("video").with_reply_handler(Arc::new(handler.clone())))
        .unwrap();
    let service = MasterService::new(registry, 4);

    service
        .handle_event(SlaveEvent::Reply {
            slave: master_domain::SlaveId(1),
            message: TaskMessageBuilder::new().with_role_name("video").build(),
        })
        .await
        .unwrap();

    assert_eq!(handler.count(), 1);
}

#[tokio::test]
async fn test_event_for_unknown_slave_is_an_error() {
    let service = service_with_roles(&["video"]);

    let error = service
        .handle_event(SlaveEvent::Disconnected {
            slave: master_domain::SlaveId(3),
        })
        .await
        .unwrap_err();
    assert!(matches!(error, MasterError::SlaveNotFound { id: 3 }));
}
