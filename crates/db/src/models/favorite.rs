use serde::{Deserialize, Serialize};

/// One favourite plant held by the server for an email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub plant_id: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Favourites list; some endpoints wrap it in `{ "favorites": [...] }`, some return it bare
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FavoritesPayload {
    Wrapped { favorites: Vec<FavoriteRecord> },
    Bare(Vec<FavoriteRecord>),
}

impl FavoritesPayload {
    pub fn into_records(self) -> Vec<FavoriteRecord> {
        match self {
            Self::Wrapped { favorites } => favorites,
            Self::Bare(records) => records,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddFavoriteRequest<'a> {
    pub email: &'a str,
    pub plant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFavoritesRequest<'a> {
    pub email: &'a str,
    pub favorite_plant_ids: &'a [i64],
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FavoriteCheck {
    #[serde(default)]
    pub is_favorite: bool,
}
