pub mod api_client;
pub mod catalog;
pub mod client;
pub mod config;
pub mod favorites;
pub mod guides;
pub mod identity;
pub mod image;
pub mod loading;
pub mod recommendations;
pub mod transform;
pub mod uhi;

#[cfg(test)]
pub(crate) mod test_support;
