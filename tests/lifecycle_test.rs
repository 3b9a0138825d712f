mod common;

use chrono::{Duration, Utc};
use common::{create_test_incident, create_test_service};
use incident_ledger::{
    error::AppError,
    lifecycle::IncidentStatus,
    models::{EventType, TagPair},
    state::IncidentStore,
};
use std::collections::BTreeSet;

#[tokio::test]
async fn test_exactly_one_start_event() {
    let (service, source) = create_test_service().await;
    let incident = create_test_incident(&service, &source, "incident1", &[]).await;

    let events = service.list_events(&incident.id).await.unwrap();
    let starts: Vec<_> = events
        .iter()
        .filter(|event| event.event_type == EventType::Start)
        .collect();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].description, "incident1");

    let result = service
        .add_event(&incident.id, EventType::Start, "again", Utc::now(), "alice")
        .await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_closed_incident_rejects_non_other_events() {
    let (service, source) = create_test_service().await;
    let incident = create_test_incident(&service, &source, "incident1", &[]).await;
    let closed_at = incident.start_time + Duration::minutes(10);

    let closed = service
        .close_incident(&incident.id, closed_at, "alice")
        .await
        .unwrap();
    assert_eq!(closed.end_time, Some(closed_at));
    assert_eq!(
        service.status(&incident.id, Utc::now()).await.unwrap(),
        IncidentStatus::Closed
    );

    assert!(matches!(
        service.close_incident(&incident.id, closed_at, "bob").await,
        Err(AppError::InvalidTransition(_))
    ));
    assert!(matches!(
        service
            .acknowledge_incident(&incident.id, "late", closed_at, None, "bob")
            .await,
        Err(AppError::InvalidTransition(_))
    ));
    assert!(matches!(
        service
            .add_event(&incident.id, EventType::Close, "again", closed_at, "bob")
            .await,
        Err(AppError::InvalidTransition(_))
    ));

    service
        .add_event(&incident.id, EventType::Other, "post mortem", closed_at, "bob")
        .await
        .unwrap();
    assert_eq!(service.list_events(&incident.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_close_through_add_event() {
    let (service, source) = create_test_service().await;
    let incident = create_test_incident(&service, &source, "incident1", &[]).await;
    let at = incident.start_time + Duration::minutes(1);

    let event = service
        .add_event(&incident.id, EventType::Close, "resolved", at, "alice")
        .await
        .unwrap();

    let stored = service.get_incident(&incident.id).await.unwrap();
    assert_eq!(stored.end_time, Some(event.timestamp));
    assert_eq!(service.get_event(&incident.id, &event.id).await.unwrap(), event);
}

#[tokio::test]
async fn test_acknowledgement_expiry_drives_status() {
    let (service, source) = create_test_service().await;
    let incident = create_test_incident(&service, &source, "incident1", &[]).await;
    let t0 = incident.start_time;

    assert_eq!(
        service.status(&incident.id, t0).await.unwrap(),
        IncidentStatus::OpenUnacked
    );

    let expiration = t0 + Duration::hours(1);
    let ack = service
        .acknowledge_incident(&incident.id, "mine", t0, Some(expiration), "alice")
        .await
        .unwrap();

    assert_eq!(
        service.status(&incident.id, expiration - Duration::seconds(1)).await.unwrap(),
        IncidentStatus::OpenAcked
    );
    assert_eq!(
        service.status(&incident.id, expiration).await.unwrap(),
        IncidentStatus::OpenUnacked
    );
    assert_eq!(
        service.get_acknowledgement(&incident.id, &ack.id()).await.unwrap(),
        ack
    );
}

#[tokio::test]
async fn test_ack_update_leaves_event_untouched() {
    let (service, source) = create_test_service().await;
    let incident = create_test_incident(&service, &source, "incident1", &[]).await;
    let at = incident.start_time + Duration::minutes(1);

    let ack = service
        .acknowledge_incident(&incident.id, "on it", at, Some(at + Duration::hours(1)), "alice")
        .await
        .unwrap();
    let events_before = service.list_events(&incident.id).await.unwrap();

    let new_expiration = Some(at + Duration::days(2));
    let updated = service
        .update_acknowledgement(&incident.id, &ack.id(), new_expiration)
        .await
        .unwrap();

    assert_eq!(updated.expiration, new_expiration);
    assert_eq!(updated.event, ack.event);
    assert_eq!(service.list_events(&incident.id).await.unwrap(), events_before);
}

#[tokio::test]
async fn test_reacknowledge_creates_new_acknowledgement() {
    let (service, source) = create_test_service().await;
    let incident = create_test_incident(&service, &source, "incident1", &[]).await;
    let t0 = incident.start_time;

    service
        .acknowledge_incident(&incident.id, "first", t0 + Duration::minutes(1), None, "alice")
        .await
        .unwrap();
    service
        .acknowledge_incident(&incident.id, "second", t0 + Duration::minutes(2), None, "bob")
        .await
        .unwrap();

    let acks = service.list_acknowledgements(&incident.id).await.unwrap();
    let descriptions: Vec<_> = acks.iter().map(|ack| ack.event.description.as_str()).collect();
    assert_eq!(descriptions, vec!["first", "second"]);
}

#[tokio::test]
async fn test_duplicate_tag_then_detach_and_reattach() {
    let (service, source) = create_test_service().await;
    let incident = create_test_incident(&service, &source, "incident1", &[]).await;

    service.attach_tag(&incident.id, "a=b", "alice").await.unwrap();
    assert!(matches!(
        service.attach_tag(&incident.id, "a=b", "alice").await,
        Err(AppError::DuplicateTag(_))
    ));

    service.detach_tag(&incident.id, "a=b").await.unwrap();
    assert!(matches!(
        service.detach_tag(&incident.id, "a=b").await,
        Err(AppError::NotFound(_))
    ));

    let relation = service.attach_tag(&incident.id, "a=b", "bob").await.unwrap();
    assert_eq!(relation.added_by, "bob");
    assert_eq!(
        service.list_tags(&incident.id).await.unwrap(),
        BTreeSet::from(["a=b".to_string()])
    );
    assert_eq!(
        service.get_tag(&incident.id, "a=b").await.unwrap().tag,
        relation.tag
    );
}

#[tokio::test]
async fn test_tag_entity_outlives_detach_and_is_shared() {
    let (service, source) = create_test_service().await;
    let first = create_test_incident(&service, &source, "incident1", &[]).await;
    let second = create_test_incident(&service, &source, "incident2", &[]).await;
    let pair = TagPair::new("a", "b");

    let attached = service.attach_tag(&first.id, "a=b", "alice").await.unwrap();
    service.detach_tag(&first.id, "a=b").await.unwrap();

    let interned = service.store().get_tag(&pair).await.unwrap().unwrap();
    assert_eq!(interned.id, attached.tag.id);

    let relation = service.attach_tag(&second.id, "a=b", "bob").await.unwrap();
    assert_eq!(relation.tag.id, attached.tag.id);
    assert_eq!(service.store().list_tags().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_tags_are_rejected() {
    let (service, source) = create_test_service().await;
    let incident = create_test_incident(&service, &source, "incident1", &[]).await;

    for text in ["ab", "=b", "a=", "Key=value"] {
        assert!(matches!(
            service.attach_tag(&incident.id, text, "alice").await,
            Err(AppError::MalformedTag(_))
        ));
    }
    assert!(service.list_tags(&incident.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_global_event_listing_is_ordered() {
    let (service, source) = create_test_service().await;
    let first = create_test_incident(&service, &source, "first", &[]).await;
    let second = create_test_incident(&service, &source, "second", &[]).await;

    service
        .add_event(
            &first.id,
            EventType::Other,
            "late note",
            second.start_time + Duration::hours(1),
            "a",
        )
        .await
        .unwrap();

    let events = service.list_all_events().await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    assert_eq!(events[2].description, "late note");
}
