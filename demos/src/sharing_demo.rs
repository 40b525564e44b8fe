use std::sync::Arc;

use listshare::prelude::*;
use listshare::tasks::filter_and_sort;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listshare=info".into()),
        )
        .init();

    let store = MemoryStore::new();
    let app = ListShare::new(Arc::new(store));
    let alice = Session::new(Principal::new("u-alice", "alice@x.com"));
    let bob = Session::new(Principal::new("u-bob", "bob@x.com"));

    println!("Starting sharing demo");

    let mut bob_lists = app.lists().list_accessible_lists(&bob).await?;
    let mut bob_tasks = app.tasks().list_tasks(&bob).await?;
    let mut bob_inbox = app.notifications().list_notifications(&bob).await?;

    let groceries = app
        .lists()
        .create_list(&alice, "Groceries", "#10b981", Some("cart"))
        .await?;
    println!("alice created list {}", groceries);

    app.lists()
        .share_list(&alice, &groceries, "bob@x.com", Permission::Write)
        .await?;
    println!("alice shared Groceries with bob (write)");

    if let Some(lists) = bob_lists
        .wait_for(|s| s.items().is_some_and(|items| !items.is_empty()))
        .await
        .and_then(|s| s.items().map(<[List]>::to_vec))
    {
        println!("bob now sees {} list(s): {:?}", lists.len(), lists.iter().map(|l| &l.name).collect::<Vec<_>>());
    }
    if let Some(notifications) = bob_inbox.ready().await {
        for n in &notifications {
            println!("bob's inbox: {} - {}", n.title, n.message);
        }
    }

    let milk = app
        .tasks()
        .create_task(&bob, &groceries, NewTask::new("Buy milk").priority(Priority::High))
        .await?;
    app.tasks()
        .create_task(&alice, &groceries, NewTask::new("Bread"))
        .await?;
    app.tasks().add_tag(&bob, &milk, "dairy", None).await?;
    println!("bob created task {}", milk);

    match app
        .lists()
        .share_list(&bob, &groceries, "carol@x.com", Permission::Read)
        .await
    {
        Err(Error::PermissionDenied(msg)) => println!("bob cannot reshare: {}", msg),
        other => println!("unexpected share result: {:?}", other.map(|o| o.list.id)),
    }

    match app
        .lists()
        .share_list(&alice, &groceries, "bob@x.com", Permission::Admin)
        .await
    {
        Err(e @ Error::AlreadyShared { .. }) => println!("{}", e),
        other => println!("unexpected share result: {:?}", other.map(|o| o.list.id)),
    }
    app.lists()
        .update_share(&alice, &groceries, "bob@x.com", Permission::Admin)
        .await?;
    println!("alice promoted bob to admin");

    if let Some(tasks) = bob_tasks
        .wait_for(|s| s.items().is_some_and(|items| items.len() == 2))
        .await
        .and_then(|s| s.items().map(<[Task]>::to_vec))
    {
        let by_priority = filter_and_sort(&tasks, &TaskFilter::default(), TaskSort::Priority);
        for task in &by_priority {
            println!("  [{}] {} ({:?})", if task.completed { "x" } else { " " }, task.title, task.priority);
        }
        let stats = listshare::lists::list_stats(&tasks, chrono::Utc::now());
        println!("stats: {:?}", stats);
    }

    bob.end();
    println!("bob signed out; live queries stopped");
    println!("Sharing demo completed");
    Ok(())
}
