//! Upload queue inspection.

use super::Context;
use anyhow::{Result, bail};
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum PendingCommand {
    /// List queued uploads
    List,

    /// Drop a queued upload without sending it
    Discard { local_id: i64 },
}

pub async fn handle(ctx: &Context, cmd: PendingCommand) -> Result<()> {
    match cmd {
        PendingCommand::List => {
            let writes = ctx.store.list_pending_writes().await?;
            if writes.is_empty() {
                println!("queue is empty");
            }
            for w in writes {
                let location = match (w.lat, w.lon) {
                    (Some(lat), Some(lon)) => format!(" @ {lat},{lon}"),
                    _ => String::new(),
                };
                println!(
                    "#{} {} [{} bytes {}] {}{}{}",
                    w.local_id,
                    w.created_at.to_rfc3339(),
                    w.photo.len(),
                    w.photo_mime,
                    w.description,
                    location,
                    if w.synced { " (synced)" } else { "" }
                );
            }
            Ok(())
        }
        PendingCommand::Discard { local_id } => {
            if !ctx.store.discard_pending_write(local_id).await? {
                bail!("no queued upload #{local_id}");
            }
            println!("discarded #{local_id}");
            Ok(())
        }
    }
}
