//! Favorites commands.

use super::Context;
use anyhow::{Result, anyhow};
use clap::Subcommand;
use storyline_client::ListStoriesQuery;
use storyline_core::{Error, Favorite, FavoriteSort, SortOrder};

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
    /// List favorites
    List {
        /// createdAt, favoritedAt or name
        #[arg(long)]
        sort: Option<FavoriteSort>,

        /// asc or desc
        #[arg(long, default_value = "desc")]
        order: SortOrder,
    },

    /// Case-insensitive search over name and description
    Search { query: String },

    /// Mark a story from the API as favorite
    Add { id: String },

    /// Remove a favorite
    Remove { id: String },
}

fn print(favorites: &[Favorite]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(favorites)?);
    Ok(())
}

pub async fn handle(ctx: &Context, cmd: FavoritesCommand) -> Result<()> {
    match cmd {
        FavoritesCommand::List { sort: None, .. } => print(&ctx.store.list_favorites().await),
        FavoritesCommand::List { sort: Some(sort), order } => print(&ctx.store.sorted_favorites(sort, order).await),
        FavoritesCommand::Search { query } => print(&ctx.store.search_favorites(&query).await),
        FavoritesCommand::Add { id } => {
            let stories = ctx
                .api()?
                .list_stories(&ctx.session()?, &ListStoriesQuery::default())
                .await?;
            let story = stories
                .iter()
                .find(|s| s.id == id)
                .ok_or_else(|| anyhow!("story {id} not found"))?;

            match ctx.store.add_favorite(story).await {
                Ok(favorite) => println!("added {} ({})", favorite.id(), favorite.story.name),
                Err(Error::FavoriteExists(_)) => println!("{id} is already a favorite"),
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        FavoritesCommand::Remove { id } => {
            ctx.store.remove_favorite(&id).await?;
            println!("removed {id}");
            Ok(())
        }
    }
}
