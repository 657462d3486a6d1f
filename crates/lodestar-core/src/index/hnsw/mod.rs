//! HNSW (Hierarchical Navigable Small World) index.
//!
//! The graph lives in a single arena of nodes addressed by integer ids; each
//! node owns one neighbor list per layer. [`HnswIndex`] adds string ids,
//! metadata, dimension checks and persistence on top.

mod graph;
mod index;
mod layer;
mod ordered_float;
pub mod params;
mod persistence;

#[cfg(test)]
mod tests;

pub use index::{HnswIndex, IndexStats, DEFAULT_LEVEL_SEED};
pub use params::{HnswParams, SearchQuality};
pub use persistence::{load_meta, HnswMeta, FORMAT_VERSION};
