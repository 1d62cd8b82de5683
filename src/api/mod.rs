//! Typed wrappers over the marketplace backend endpoints

mod agent;
mod auth;
mod catalog;
mod seller;

pub use agent::AgentApi;
pub use auth::AuthApi;
pub use catalog::{CatalogApi, PRODUCT_CACHE_TTL};
pub use seller::SellerApi;
