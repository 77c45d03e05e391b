//! Push subscription commands.

use super::Context;
use anyhow::Result;
use clap::Subcommand;
use std::sync::Arc;
use storyline_client::{ProvidedEndpoint, PushEndpointProvider, PushRegistration, SubscriptionManager};

#[derive(Subcommand, Debug)]
pub enum PushCommand {
    /// Show the stored registration
    Status,

    /// Register an endpoint issued by the push service and mirror it to the server
    Subscribe {
        #[arg(long)]
        endpoint: String,

        #[arg(long)]
        p256dh: String,

        #[arg(long)]
        auth: String,
    },

    /// Forget the registration locally, then tell the server
    Unsubscribe,
}

fn manager(ctx: &Context, provider: ProvidedEndpoint) -> Result<SubscriptionManager> {
    let provider: Arc<dyn PushEndpointProvider> = Arc::new(provider);
    let server = Arc::new(ctx.api()?.authorized(ctx.session()?));
    Ok(SubscriptionManager::new(ctx.store.clone(), provider, server, &ctx.config.vapid_public_key)?)
}

pub async fn handle(ctx: &Context, cmd: PushCommand) -> Result<()> {
    match cmd {
        PushCommand::Status => {
            match ctx.store.current_subscription().await? {
                Some(sub) => println!(
                    "subscribed {} since {}{}",
                    sub.endpoint,
                    sub.created_at.to_rfc3339(),
                    if sub.mirrored { "" } else { " (server not yet informed)" }
                ),
                None => println!("not subscribed"),
            }
            Ok(())
        }
        PushCommand::Subscribe { endpoint, p256dh, auth } => {
            let sub = manager(ctx, ProvidedEndpoint::new(PushRegistration { endpoint, p256dh, auth }))?
                .subscribe()
                .await?;
            if sub.mirrored {
                println!("subscribed {}", sub.endpoint);
            } else {
                println!("subscribed {} locally; server will be retried on next subscribe", sub.endpoint);
            }
            Ok(())
        }
        PushCommand::Unsubscribe => {
            let outcome = manager(ctx, ProvidedEndpoint::none())?.unsubscribe().await?;
            match (outcome.existed, outcome.server_acknowledged) {
                (false, _) => println!("not subscribed"),
                (true, true) => println!("unsubscribed"),
                (true, false) => println!("unsubscribed locally; server did not confirm"),
            }
            Ok(())
        }
    }
}
