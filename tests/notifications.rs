mod common;

use common::*;
use listshare::notifications::{unread_count, NewNotification, NotificationData};
use listshare::prelude::*;

fn assigned(recipient: &str, title: &str) -> NewNotification {
    NewNotification {
        kind: NotificationType::TaskAssigned,
        title: title.to_string(),
        message: format!("{title} was assigned to you"),
        recipient_email: recipient.to_string(),
        data: Some(NotificationData {
            task_id: Some("t1".to_string()),
            ..NotificationData::default()
        }),
    }
}

#[tokio::test]
async fn test_feed_is_per_recipient_and_newest_first() {
    let f = setup();
    let service = f.app.notifications();
    let first = service.create_notification(assigned(BOB, "First")).await.unwrap();
    let second = service.create_notification(assigned(" Bob@X.com", "Second")).await.unwrap();
    service.create_notification(assigned(CAROL, "Other")).await.unwrap();

    let mut feed = service.list_notifications(&f.bob).await.unwrap();
    let got = wait_for_ids(&mut feed, |n| n.id.as_str(), &[first.as_str(), second.as_str()]).await;
    assert_eq!(got[0].id, second);
    assert_eq!(got[1].id, first);
    assert_eq!(unread_count(&got), 2);
}

#[tokio::test]
async fn test_mark_as_read_is_recipient_only_and_idempotent() {
    let f = setup();
    let service = f.app.notifications();
    let id = service.create_notification(assigned(BOB, "Mop")).await.unwrap();

    let err = service.mark_as_read(&f.alice, &id).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    service.mark_as_read(&f.bob, &id).await.unwrap();
    service.mark_as_read(&f.bob, &id).await.unwrap();

    let mut feed = service.list_notifications(&f.bob).await.unwrap();
    let got = wait_for_ids(&mut feed, |n| n.id.as_str(), &[id.as_str()]).await;
    assert!(got[0].read);
    assert_eq!(unread_count(&got), 0);

    let err = service.mark_as_read(&f.bob, "missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "Notification", .. }));
}

#[tokio::test]
async fn test_mark_all_as_read() {
    let f = setup();
    let service = f.app.notifications();
    for title in ["A", "B", "C"] {
        service.create_notification(assigned(BOB, title)).await.unwrap();
    }
    let alice_id = service.create_notification(assigned(ALICE, "D")).await.unwrap();

    let mut feed = service.list_notifications(&f.bob).await.unwrap();
    let got = within(feed.ready()).await.unwrap();
    service.mark_as_read(&f.bob, &got[0].id).await.unwrap();

    assert_eq!(service.mark_all_as_read(&f.bob).await.unwrap(), 2);
    assert_eq!(service.mark_all_as_read(&f.bob).await.unwrap(), 0);

    let state = within(feed.wait_for(|s| s.items().is_some_and(|items| unread_count(items) == 0)))
        .await
        .unwrap();
    assert_eq!(state.items().unwrap().len(), 3);

    let mut alice_feed = service.list_notifications(&f.alice).await.unwrap();
    let alice = wait_for_ids(&mut alice_feed, |n| n.id.as_str(), &[alice_id.as_str()]).await;
    assert!(!alice[0].read);
}

#[tokio::test]
async fn test_create_rejects_bad_recipient() {
    let f = setup();
    let err = f
        .app
        .notifications()
        .create_notification(assigned("nobody", "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
