use anyhow::{Context, Result};
use services::services::{
    client::PlantopiaClient, identity::Identity, recommendations::SearchParams,
};
use tracing::warn;

pub async fn browse(
    client: &PlantopiaClient,
    page: u32,
    limit: u32,
    category: Option<String>,
    search: Option<String>,
    prefetch: bool,
) -> Result<()> {
    let catalog = client.catalog();
    let total = catalog
        .load_page(page, limit, category.as_deref(), search.as_deref())
        .await
        .context("loading catalog page")?;

    let plants = catalog.page(page).await.unwrap_or_default();
    println!("Page {page} ({} of {total} plants)", plants.len());
    for plant in &plants {
        println!("  [{}] {} ({})", plant.id, plant.name, plant.category);
    }

    if prefetch
        && catalog
            .start_prefetch(limit, category.as_deref(), search.as_deref())
            .await
    {
        catalog.wait_for_prefetch().await;
        let pages = catalog.cached_pages().await;
        let loaded = catalog.loaded_plants().await.len();
        println!("Prefetched {} pages, {loaded} plants loaded", pages.len());
    }
    Ok(())
}

pub async fn recommend(client: &PlantopiaClient, params: SearchParams) -> Result<()> {
    let store = client.recommendations();
    store
        .submit_search(params)
        .await
        .context("requesting recommendations")?;

    let results = store.results().await;
    println!(
        "{} ({}), {}",
        results.suburb, results.climate_zone, results.month_now
    );
    for plant in &results.plants {
        let score = plant
            .recommendation
            .as_ref()
            .map(|r| format!("{:.1}", r.score))
            .unwrap_or_default();
        println!("  {score:>5}  {} ({})", plant.name, plant.category);
    }
    for note in &results.notes {
        println!("note: {note}");
    }
    Ok(())
}

async fn restore_favorites(client: &PlantopiaClient) -> Result<()> {
    client.identity().load().await?;
    if let Err(e) = client.favorites().load_from_server().await {
        warn!(error = %e, "Server favourites unavailable, showing local set");
        client.favorites().load_local().await;
    }
    Ok(())
}

pub async fn list_favorites(client: &PlantopiaClient) -> Result<()> {
    restore_favorites(client).await?;
    let favorites = client.favorites().favorites();
    if favorites.is_empty() {
        println!("No favourite plants yet");
    }
    for id in favorites {
        println!("{id}");
    }
    Ok(())
}

pub async fn toggle_favorite(client: &PlantopiaClient, id: i64) -> Result<()> {
    restore_favorites(client).await?;
    let added = client.favorites().toggle(id).await?;
    println!("{} plant {id}", if added { "Added" } else { "Removed" });
    Ok(())
}

pub async fn list_guides(client: &PlantopiaClient) -> Result<()> {
    client.identity().load().await?;
    let guides = client.guides();
    guides.ensure_loaded().await;

    for category in guides.categories().await? {
        println!("{} ({})", category.name, category.slug);
        for file in guides.cached_files(&category.slug).unwrap_or_default() {
            let star = if guides.is_favorite(&category.slug, &file.filename) {
                "*"
            } else {
                " "
            };
            println!(" {star} {}", file.title.as_deref().unwrap_or(&file.filename));
        }
    }
    Ok(())
}

pub async fn show_guide(client: &PlantopiaClient, category: &str, file: &str) -> Result<()> {
    let content = client.guides().file_content(category, file).await?;
    println!("{content}");
    Ok(())
}

pub async fn login(client: &PlantopiaClient, identity: Identity) -> Result<()> {
    let identity = client.sign_in(identity).await?;
    println!(
        "Signed in as {}, {} favourite plants",
        identity.email,
        client.favorites().len()
    );
    Ok(())
}

pub async fn logout(client: &PlantopiaClient) -> Result<()> {
    client.identity().load().await?;
    client.sign_out().await?;
    println!("Signed out");
    Ok(())
}
