pub mod api_plant;
pub mod favorite;
pub mod guide;
pub mod local_entry;
pub mod plant;
pub mod quantify;
pub mod recommendation;
pub mod tracking;
pub mod uhi;
