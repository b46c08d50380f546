//! `plantopia` command-line front end for the sync layer.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use db::{DBService, storage::LocalStorage};
use services::services::{
    client::PlantopiaClient, config::ClientConfig, identity::Identity,
    recommendations::SearchParams,
};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "plantopia", version, about = "Browse plants, guides and favourites")]
pub struct Cli {
    /// Backend origin; overrides the environment
    #[arg(long, env = "PLANTOPIA_API_URL")]
    pub api_url: Option<String>,

    /// SQLite file holding identity and anonymous favourites
    #[arg(long, env = "PLANTOPIA_DATA", default_value = "plantopia.db")]
    pub data: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List one page of the plant catalog
    Browse {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Keep loading the remaining pages before exiting
        #[arg(long)]
        prefetch: bool,
    },
    /// Ask the backend for plant recommendations
    Recommend {
        #[arg(long)]
        location: String,
        #[arg(long, default_value = "Balcony")]
        location_type: String,
        #[arg(long, default_value = "Part Sun (3-6h)")]
        sunlight: String,
        #[arg(long, default_value = "Mixed")]
        goal: String,
        #[arg(long)]
        containers: bool,
        #[arg(long)]
        fragrant: bool,
        #[arg(long)]
        pets: bool,
    },
    #[command(subcommand)]
    Favorites(FavoritesCommand),
    #[command(subcommand)]
    Guides(GuidesCommand),
    /// Remember an identity and merge local favourites into the server set
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    Logout,
}

#[derive(Debug, Subcommand)]
pub enum FavoritesCommand {
    List,
    /// Add or remove a plant by its server id
    Toggle { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum GuidesCommand {
    List,
    Show { category: String, file: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::logging::init_tracing();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env().context("reading configuration")?;
    if let Some(url) = cli.api_url.as_deref() {
        config = config.with_api_url(url)?;
    }

    let db = DBService::new(&cli.data)
        .await
        .with_context(|| format!("opening {}", cli.data.display()))?;
    let storage: Arc<dyn LocalStorage> = Arc::new(db);
    let client = PlantopiaClient::new(config, storage)?;

    match cli.command {
        Commands::Browse {
            page,
            limit,
            category,
            search,
            prefetch,
        } => {
            let limit = limit.unwrap_or(client.config().default_page_size);
            commands::browse(&client, page, limit, category, search, prefetch).await
        }
        Commands::Recommend {
            location,
            location_type,
            sunlight,
            goal,
            containers,
            fragrant,
            pets,
        } => {
            let params = SearchParams {
                location,
                location_type,
                sunlight,
                goal,
                has_containers: containers,
                fragrant,
                pets_or_toddlers: pets,
                ..Default::default()
            };
            commands::recommend(&client, params).await
        }
        Commands::Favorites(FavoritesCommand::List) => commands::list_favorites(&client).await,
        Commands::Favorites(FavoritesCommand::Toggle { id }) => {
            commands::toggle_favorite(&client, id).await
        }
        Commands::Guides(GuidesCommand::List) => commands::list_guides(&client).await,
        Commands::Guides(GuidesCommand::Show { category, file }) => {
            commands::show_guide(&client, &category, &file).await
        }
        Commands::Login { email, name } => {
            let identity = match name {
                Some(name) => Identity::new(email).with_name(name),
                None => Identity::new(email),
            };
            commands::login(&client, identity).await
        }
        Commands::Logout => commands::logout(&client).await,
    }
}
