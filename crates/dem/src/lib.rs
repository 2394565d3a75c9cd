//! Digital elevation model tiles and their cache.
//!
//! A [`Tile`] is a rectangular raster of cell-centered elevations over a
//! geographic extent; elevation between samples is bilinear. The
//! [`MinMaxTreeTile`] variant adds an implicit min/max k-d tree over
//! hierarchical groups of cells, which intersection algorithms use to skip
//! whole sub-tiles at once. Tiles are produced on demand by a user-supplied
//! [`TileUpdater`] and kept in a bounded least-recently-used [`TileCache`].

pub type Result<T = ()> = std::result::Result<T, Error>;

mod cache;
mod error;
mod minmaxtile;
mod simpletile;
mod tile;

#[doc(inline)]
pub use {
    cache::TileCache, cache::TileUpdater, error::Error, minmaxtile::MinMaxTreeTile, simpletile::SimpleTile,
    tile::Location, tile::Tile, tile::UpdatableTile,
};
