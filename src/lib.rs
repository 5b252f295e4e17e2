//! Catalog feed synchronization: pulls products, clients, groups, promotions
//! and image data from published spreadsheets (falling back to local
//! workbooks) and writes one normalized JSON file per feed.

pub mod config;
pub mod drive;
pub mod enrich;
pub mod feed;
pub mod fetch;
pub mod normalize;
pub mod output;
pub mod source;
pub mod sync;
