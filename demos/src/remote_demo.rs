use std::env;

use listshare::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listshare=info".into()),
        )
        .init();

    let email = env::var("LISTSHARE_DEMO_EMAIL").expect("LISTSHARE_DEMO_EMAIL must be set");
    let password = env::var("LISTSHARE_DEMO_PASSWORD").expect("LISTSHARE_DEMO_PASSWORD must be set");

    let app = ListShare::from_env()?;
    println!("Starting remote demo");

    let session = app.sign_in(&email, &password).await?;
    println!("signed in as {}", session.email());

    let mut lists = app.lists().list_accessible_lists(&session).await?;
    match lists.ready().await {
        Some(lists) => {
            for list in &lists {
                let access = listshare::lists::effective_access(list, session.email());
                println!("{} ({}, {} collaborator(s))", list.name, access, list.shared_with.len());
            }
        }
        None => println!("failed to load lists: {:?}", lists.state()),
    }

    let mut inbox = app.notifications().list_notifications(&session).await?;
    if let Some(notifications) = inbox.ready().await {
        println!(
            "{} unread notification(s)",
            listshare::notifications::unread_count(&notifications)
        );
    }

    app.sign_out(&session).await?;
    println!("Remote demo completed");
    Ok(())
}
