//! Cache agent commands: install, activate, fetch, stories.

use super::Context;
use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use storyline_client::{ListStoriesQuery, LifecycleManager, Network, Request};

fn lifecycle(ctx: &Context) -> LifecycleManager {
    let network: Arc<dyn Network> = Arc::new(ctx.network.clone());
    LifecycleManager::new(ctx.store.clone(), network, &ctx.config)
}

pub async fn install(ctx: &Context) -> Result<()> {
    let assets = lifecycle(ctx).install().await?;
    println!("installed {assets} assets into {}", ctx.config.static_cache_name());
    Ok(())
}

pub async fn activate(ctx: &Context) -> Result<()> {
    let deleted = lifecycle(ctx).activate().await?;
    if deleted.is_empty() {
        println!("no stale generations");
    }
    for name in deleted {
        println!("deleted {name}");
    }
    Ok(())
}

pub async fn fetch(ctx: &Context, url: &str, print_body: bool) -> Result<()> {
    let served = ctx.router.handle(&Request::get_str(url)?).await?;
    eprintln!(
        "{} {:?} {} bytes",
        served.response.status.as_u16(),
        served.source,
        served.response.body.len()
    );
    if print_body {
        std::io::stdout().write_all(&served.response.body)?;
    }
    Ok(())
}

pub async fn stories(ctx: &Context, location: bool, page: Option<u32>, size: Option<u32>) -> Result<()> {
    let query = ListStoriesQuery { page, size, location };
    let stories = ctx.api()?.list_stories(&ctx.session()?, &query).await?;
    println!("{}", serde_json::to_string_pretty(&stories)?);
    Ok(())
}
