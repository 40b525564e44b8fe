mod common;

use chrono::{Duration, Utc};
use common::*;
use listshare::collections::TASKS;
use listshare::store::{FieldOps, StoreError};
use listshare::prelude::*;
use listshare::tasks::palette_color;

async fn shared_list(f: &Fixture) -> String {
    let lists = f.app.lists();
    let list_id = lists.create_list(&f.alice, "Groceries", "#000", None).await.unwrap();
    lists.share_list(&f.alice, &list_id, BOB, Permission::Write).await.unwrap();
    lists.share_list(&f.alice, &list_id, CAROL, Permission::Read).await.unwrap();
    list_id
}

#[tokio::test]
async fn test_write_gating() {
    let f = setup();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;
    let task_id = tasks.create_task(&f.bob, &list_id, NewTask::new("Buy milk")).await.unwrap();

    // read grant: visible but not writable
    assert_eq!(tasks.get_task(&f.carol, &task_id).await.unwrap().title, "Buy milk");
    let denied = |r: Result<_>| matches!(r, Err(Error::PermissionDenied(_)));
    assert!(denied(tasks.create_task(&f.carol, &list_id, NewTask::new("Eggs")).await.map(|_| ())));
    assert!(denied(
        tasks
            .update_task(&f.carol, &task_id, TaskPatch::default().title("Oat milk"))
            .await
            .map(|_| ())
    ));
    assert!(denied(tasks.toggle_task(&f.carol, &task_id).await.map(|_| ())));
    assert!(denied(tasks.delete_task(&f.carol, &task_id).await));

    // no grant: the list and its tasks do not exist for this principal
    let dave = Session::new(Principal::new("u-dave", "dave@x.com"));
    let err = tasks.create_task(&dave, &list_id, NewTask::new("Sneaky")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "List", .. }));
    let err = tasks.get_task(&dave, &task_id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "Task", .. }));

    // write grant succeeds
    let task = tasks
        .update_task(&f.bob, &task_id, TaskPatch::default().title("Oat milk").priority(Priority::High))
        .await
        .unwrap();
    assert_eq!(task.title, "Oat milk");
    assert_eq!(task.priority, Priority::High);
    tasks.delete_task(&f.alice, &task_id).await.unwrap();
    assert!(f.store.is_empty(TASKS));
}

#[tokio::test]
async fn test_create_task_defaults() {
    let f = setup();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;
    let task_id = tasks.create_task(&f.bob, &list_id, NewTask::new("  Bread ")).await.unwrap();

    let task = tasks.get_task(&f.alice, &task_id).await.unwrap();
    assert_eq!(task.title, "Bread");
    assert!(!task.completed);
    assert!(task.tags.is_empty());
    assert!(task.subtasks.is_empty());
    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.list_id, list_id);
    assert_eq!(task.owner_id, "u-bob");
    assert!(task.created_at.is_some());

    let err = tasks.create_task(&f.bob, &list_id, NewTask::new("")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    let err = tasks.create_task(&f.bob, "missing", NewTask::new("x")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_toggle_twice_restores_state() {
    let f = setup();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;
    let task_id = tasks.create_task(&f.alice, &list_id, NewTask::new("Laundry")).await.unwrap();

    let once = tasks.toggle_task(&f.alice, &task_id).await.unwrap();
    assert!(once.completed);
    let twice = tasks.toggle_task(&f.bob, &task_id).await.unwrap();
    assert!(!twice.completed);
    assert!(twice.updated_at >= once.updated_at);
}

#[tokio::test]
async fn test_concurrent_toggles_cancel_out() {
    let (f, store) = setup_intercepted();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;
    let task_id = tasks.create_task(&f.alice, &list_id, NewTask::new("Dishes")).await.unwrap();

    // Bob's toggle lands after alice read the task, before she writes.
    store.interleave(
        TASKS,
        &task_id,
        FieldOps::new().set("completed", true).server_timestamp("updatedAt"),
    );

    let task = tasks.toggle_task(&f.alice, &task_id).await.unwrap();
    assert!(!task.completed);
    assert_eq!(store.precondition_failures(), 1);
    assert!(!tasks.get_task(&f.bob, &task_id).await.unwrap().completed);
}

#[tokio::test]
async fn test_toggle_gives_up_after_retry_budget() {
    let (f, store) = setup_intercepted();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;
    let task_id = tasks.create_task(&f.alice, &list_id, NewTask::new("Dishes")).await.unwrap();

    // One competing write per attempt: the first try plus three retries.
    for _ in 0..4 {
        store.interleave(TASKS, &task_id, FieldOps::new().server_timestamp("updatedAt"));
    }

    let err = tasks.toggle_task(&f.alice, &task_id).await.unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::PreconditionFailed { .. })), "{err:?}");
    assert_eq!(store.precondition_failures(), 4);
    assert!(!tasks.get_task(&f.alice, &task_id).await.unwrap().completed);
}

#[tokio::test]
async fn test_tags() {
    let f = setup();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;
    let task_id = tasks.create_task(&f.alice, &list_id, NewTask::new("Call mom")).await.unwrap();

    let task = tasks.add_tag(&f.bob, &task_id, "Family", None).await.unwrap();
    assert_eq!(task.tags.len(), 1);
    assert_eq!(task.tags[0].color, palette_color("Family"));

    let err = tasks.add_tag(&f.bob, &task_id, "family", Some("#fff")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let task = tasks.add_tag(&f.bob, &task_id, "Phone", Some("#123456")).await.unwrap();
    assert_eq!(task.tags[1].color, "#123456");

    let family_id = task.tags[0].id.clone();
    let task = tasks.remove_tag(&f.alice, &task_id, &family_id).await.unwrap();
    assert_eq!(task.tags.len(), 1);
    assert_eq!(task.tags[0].name, "Phone");

    let err = tasks.remove_tag(&f.alice, &task_id, &family_id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "Tag", .. }));
    let err = tasks.add_tag(&f.carol, &task_id, "Mine", None).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
}

#[tokio::test]
async fn test_subtasks() {
    let f = setup();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;
    let task_id = tasks.create_task(&f.alice, &list_id, NewTask::new("Bake")).await.unwrap();

    tasks.add_subtask(&f.bob, &task_id, "Flour").await.unwrap();
    let task = tasks.add_subtask(&f.bob, &task_id, "Sugar").await.unwrap();
    let texts: Vec<&str> = task.subtasks.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, ["Flour", "Sugar"]);

    let flour = task.subtasks[0].id.clone();
    let task = tasks.toggle_subtask(&f.bob, &task_id, &flour).await.unwrap();
    assert_eq!(task.subtask_progress(), (1, 2));

    let task = tasks.remove_subtask(&f.alice, &task_id, &flour).await.unwrap();
    assert_eq!(task.subtasks.len(), 1);
    assert_eq!(task.subtask_progress(), (0, 1));

    let err = tasks.toggle_subtask(&f.bob, &task_id, &flour).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "Subtask", .. }));
    let err = tasks.add_subtask(&f.bob, &task_id, " ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_list_stats() {
    let f = setup();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;
    let now = Utc::now();

    tasks
        .create_task(&f.alice, &list_id, NewTask::new("Late").due_date(now - Duration::days(1)))
        .await
        .unwrap();
    tasks
        .create_task(
            &f.alice,
            &list_id,
            NewTask::new("Soon").priority(Priority::High).due_date(now + Duration::days(2)),
        )
        .await
        .unwrap();
    let done = tasks.create_task(&f.alice, &list_id, NewTask::new("Done")).await.unwrap();
    tasks.toggle_task(&f.alice, &done).await.unwrap();

    let stats = tasks.list_stats(&f.carol, &list_id, now).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.high_priority, 1);
    assert_eq!(stats.overdue, 1);
    assert_eq!(stats.due_soon, 1);
}

#[tokio::test]
async fn test_templates() {
    let f = setup();
    let tasks = f.app.tasks();
    let list_id = shared_list(&f).await;

    let template_id = tasks
        .create_template(
            &f.bob,
            NewTemplate::new("Weekly shop")
                .task(TemplateTask::new("Milk", Priority::High))
                .task(TemplateTask::new("Bread", Priority::Low)),
        )
        .await
        .unwrap();

    let mut templates = tasks.list_templates(&f.bob).await.unwrap();
    let listed = wait_for_ids(&mut templates, |t| t.id.as_str(), &[template_id.as_str()]).await;
    assert_eq!(listed[0].tasks.len(), 2);

    let ids = tasks.apply_template(&f.bob, &list_id, &template_id).await.unwrap();
    assert_eq!(ids.len(), 2);
    let milk = tasks.get_task(&f.alice, &ids[0]).await.unwrap();
    assert_eq!(milk.title, "Milk");
    assert_eq!(milk.priority, Priority::High);
    assert_eq!(milk.list_id, list_id);

    // carol holds only read on the list, and the template is not hers
    let err = tasks.apply_template(&f.carol, &list_id, &template_id).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
    let err = tasks.delete_template(&f.alice, &template_id).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    tasks.delete_template(&f.bob, &template_id).await.unwrap();
    wait_for_ids(&mut templates, |t| t.id.as_str(), &[]).await;

    let err = tasks
        .create_template(&f.bob, NewTemplate::new(" "))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_categories() {
    let f = setup();
    let categories = f.app.categories();

    let work = categories
        .create_category(&f.alice, "Work", "#3b82f6", Some("briefcase"))
        .await
        .unwrap();
    categories.create_category(&f.bob, "Home", "#10b981", None).await.unwrap();

    let mut alice_categories = categories.list_categories(&f.alice).await.unwrap();
    let listed = wait_for_ids(&mut alice_categories, |c| c.id.as_str(), &[work.as_str()]).await;
    assert_eq!(listed[0].name, "Work");
    assert_eq!(listed[0].user_id, "u-alice");

    let err = categories.delete_category(&f.bob, &work).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
    categories.delete_category(&f.alice, &work).await.unwrap();
    wait_for_ids(&mut alice_categories, |c| c.id.as_str(), &[]).await;

    let err = categories.delete_category(&f.alice, &work).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "Category", .. }));
}
