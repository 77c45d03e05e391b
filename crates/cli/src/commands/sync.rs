//! Upload queue commands: submit, sync, run.

use super::Context;
use anyhow::{Context as _, Result, bail};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyline_client::{Reconciler, SubmitOutcome, StoryUploader, sync_channel};
use storyline_core::NewPendingWrite;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Story text
    #[arg(short, long)]
    description: String,

    /// Photo file to attach
    #[arg(short, long)]
    photo: PathBuf,

    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Queue without attempting an upload
    #[arg(long)]
    offline: bool,
}

fn photo_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

fn reconciler(ctx: &Context, online: bool) -> Result<(Reconciler, watch::Sender<bool>)> {
    let uploader: Arc<dyn StoryUploader> = Arc::new(ctx.api()?.authorized(ctx.session()?));
    let (tx, rx) = watch::channel(online);
    Ok((Reconciler::new(ctx.store.clone(), uploader, rx), tx))
}

pub async fn submit(ctx: &Context, args: SubmitArgs) -> Result<()> {
    let photo = std::fs::read(&args.photo).with_context(|| format!("cannot read {}", args.photo.display()))?;

    let mut write = NewPendingWrite::new(args.description, photo);
    write.photo_mime = photo_mime(&args.photo).to_string();
    if let Some(name) = args.photo.file_name().and_then(|n| n.to_str()) {
        write.photo_name = name.to_string();
    }
    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        write = write.with_location(lat, lon);
    }

    let (reconciler, _online) = reconciler(ctx, !args.offline)?;
    match reconciler.submit(&write).await? {
        SubmitOutcome::Delivered => println!("delivered"),
        SubmitOutcome::Queued { local_id } => println!("queued as #{local_id}"),
    }
    Ok(())
}

pub async fn sweep(ctx: &Context) -> Result<()> {
    let (reconciler, _online) = reconciler(ctx, true)?;
    let report = reconciler.sweep().await?;
    println!(
        "attempted {} delivered {} failed {} purged {}",
        report.attempted, report.delivered, report.failed, report.purged
    );
    if report.failed > 0 {
        bail!("{} uploads still queued", report.failed);
    }
    Ok(())
}

/// Sweep once, then on every tick until Ctrl-C.
pub async fn run(ctx: &Context) -> Result<()> {
    let (reconciler, online) = reconciler(ctx, true)?;
    let (handle, requests) = sync_channel(8);
    let period = ctx.config.sync_interval();

    let runner = reconciler.clone();
    let task = tokio::spawn(async move { runner.run(requests, period).await });

    if let Err(e) = handle.sync().await {
        tracing::warn!("initial sweep failed: {e}");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, stopping");
    drop(online);

    let sweeps = task.await?;
    println!("ran {sweeps} sweeps");
    Ok(())
}
