// Expose modules for benchmarks and tests

pub mod feed;
pub mod fetch;
pub mod index_cache;
pub mod normalize;
pub mod poll;
pub mod price_cache;
pub mod push;
pub mod types;
