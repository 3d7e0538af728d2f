//! Call events from the external call store

mod common;

use std::sync::Arc;

use ccm_sip_event_core::prelude::*;
use chrono::{Duration, Utc};
use common::{external, manager};
use uuid::Uuid;

#[tokio::test]
async fn test_external_start_creates_external_call() {
    let (manager, stores) = manager();
    let reporter = Uuid::new_v4();
    let mut start = external(ExternalDialogStatus::Start, "ext-1");
    start.from_id = reporter.to_string();
    start.to_id = "not-a-uuid".to_string();
    let started = Utc::now() - Duration::minutes(2);
    start.started = Some(started);

    let result = manager.handle(SipEvent::ExternalDialog(start)).await;
    assert_eq!(result.change_status(), ChangeStatus::CallStarted);
    assert_eq!(result.sip_address(), Some("reporter1"));

    let call = stores.calls.call(result.changed_object_id().unwrap()).unwrap();
    assert!(call.is_external);
    assert!(call.is_started);
    assert!(call.key.is_external());
    assert_eq!(call.started, started);
    assert_eq!(call.from.registration_id, Some(reporter));
    assert_eq!(call.to.registration_id, None);
    assert_eq!(call.from.category.as_deref(), Some("Field"));
    assert_eq!(call.to.display_name, "Studio 4");
}

#[tokio::test]
async fn test_external_start_twice_is_nothing_changed() {
    let (manager, stores) = manager();
    let start = external(ExternalDialogStatus::Start, "ext-2");

    let first = manager.handle_external_dialog(&start).await;
    let second = manager.handle_external_dialog(&start).await;

    assert_eq!(first.change_status(), ChangeStatus::CallStarted);
    assert!(second.is_nothing_changed());
    assert_eq!(stores.calls.open_call_count(), 1);
}

#[tokio::test]
async fn test_external_start_with_end_time_closes_existing_call() {
    let (manager, stores) = manager();
    let start = external(ExternalDialogStatus::Start, "ext-3");
    let first = manager.handle_external_dialog(&start).await;

    let mut ended = start.clone();
    ended.ended = Some(Utc::now());
    let result = manager.handle_external_dialog(&ended).await;

    assert_eq!(result.change_status(), ChangeStatus::CallClosed);
    assert_eq!(result.changed_object_id(), first.changed_object_id());
    assert_eq!(stores.calls.open_call_count(), 0);
    assert_eq!(stores.history.len(), 1);
}

#[tokio::test]
async fn test_external_start_already_ended_is_archived() {
    let (manager, stores) = manager();
    let mut start = external(ExternalDialogStatus::Start, "ext-4");
    start.started = Some(Utc::now() - Duration::minutes(5));
    start.ended = Some(Utc::now());

    manager.handle_external_dialog(&start).await;

    assert_eq!(stores.calls.open_call_count(), 0);
    let history = stores.history.list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_external);

    // A redelivery must not create the call again
    let again = manager.handle_external_dialog(&start).await;
    assert!(again.is_nothing_changed());
    assert_eq!(stores.history.len(), 1);
}

#[tokio::test]
async fn test_external_end_twice() {
    let (manager, _stores) = manager();
    manager
        .handle_external_dialog(&external(ExternalDialogStatus::Start, "ext-5"))
        .await;
    let end = external(ExternalDialogStatus::End, "ext-5");

    let first = manager.handle_external_dialog(&end).await;
    let second = manager.handle_external_dialog(&end).await;

    assert_eq!(first.change_status(), ChangeStatus::CallClosed);
    assert!(second.is_nothing_changed());
}

#[tokio::test]
async fn test_external_end_for_unknown_call() {
    let (manager, _stores) = manager();
    let end = external(ExternalDialogStatus::End, "ext-unknown");
    assert!(manager.handle_external_dialog(&end).await.is_nothing_changed());
}

#[tokio::test]
async fn test_external_party_location() {
    let history = Arc::new(InMemoryCallHistoryStore::new());
    let calls = Arc::new(InMemoryCallStore::new(history, Duration::hours(1)));
    let locations = StaticLocationResolver::new()
        .with_network("10.0.0.0".parse().unwrap(), 8, "Sweden")
        .with_network("10.20.0.0".parse().unwrap(), 16, "Stockholm");
    let manager = SipEventManager::builder(Arc::new(InMemoryRegistrationStore::new()), calls.clone())
        .with_location_resolver(Arc::new(locations))
        .build()
        .unwrap();

    let mut start = external(ExternalDialogStatus::Start, "ext-6");
    start.from_ip = Some("10.20.3.4".to_string());
    start.to_ip = Some("192.168.1.1".to_string());
    let result = manager.handle_external_dialog(&start).await;

    let call = calls.call(result.changed_object_id().unwrap()).unwrap();
    assert_eq!(call.from.external_location.as_deref(), Some("Stockholm"));
    assert_eq!(call.to.external_location, None);
}

#[tokio::test]
async fn test_external_and_proxy_keys_do_not_collide() {
    let (manager, stores) = manager();
    manager
        .handle_external_dialog(&external(ExternalDialogStatus::Start, "shared"))
        .await;
    let proxy = common::dialog(DialogStatus::Start, "shared", "sip:alice@sr.se", "sip:bob@sr.se");
    let result = manager.handle(SipEvent::Dialog(proxy)).await;

    assert_eq!(result.change_status(), ChangeStatus::CallStarted);
    assert_eq!(stores.calls.open_call_count(), 2);
}
