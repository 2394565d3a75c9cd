use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::{Error, Location, Result, Tile, UpdatableTile};

/// User-supplied factory filling tiles on cache misses.
///
/// Implementations must call
/// [`set_geometry`](crate::UpdatableTile::set_geometry) then
/// [`set_elevation`](crate::UpdatableTile::set_elevation) for every sample of
/// a tile whose interpolable interior contains the requested position; the
/// tile corner chosen for a position must be deterministic. Updaters may
/// perform I/O, they are only invoked when the cache misses.
pub trait TileUpdater: Send + Sync {
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut dyn UpdatableTile) -> Result;
}

/// Bounded cache of elevation tiles keyed by the geodetic positions they
/// cover, with least-recently-used eviction.
///
/// Lookups and eviction are serialized by an internal lock; the updater runs
/// with the lock held, so it must not call back into the cache.
pub struct TileCache<T> {
    updater: Arc<dyn TileUpdater>,
    capacity: usize,
    /// Most recently used first.
    tiles: Mutex<Vec<Arc<T>>>,
}

impl<T: Tile + UpdatableTile + Default> TileCache<T> {
    pub fn new(updater: Arc<dyn TileUpdater>, capacity: usize) -> Self {
        TileCache {
            updater,
            capacity: capacity.max(1),
            tiles: Mutex::new(Vec::new()),
        }
    }

    /// The tile whose interpolable interior contains `(latitude, longitude)`,
    /// created through the updater when not cached yet.
    pub fn get_tile(&self, latitude: f64, longitude: f64) -> Result<Arc<T>> {
        let mut tiles = self.tiles.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(pos) = tiles
            .iter()
            .position(|t| t.location(latitude, longitude) == Location::HasInterpolationNeighbors)
        {
            let tile = tiles.remove(pos);
            tiles.insert(0, Arc::clone(&tile));
            return Ok(tile);
        }

        debug!(
            "tile cache miss at lat {:.6}\u{b0}, lon {:.6}\u{b0}",
            latitude.to_degrees(),
            longitude.to_degrees()
        );

        let mut tile = T::default();
        self.updater.update_tile(latitude, longitude, &mut tile)?;
        if tile.latitude_rows() == 0 || tile.longitude_columns() == 0 {
            return Err(Error::NoDemData { latitude, longitude });
        }
        tile.tile_update_completed()?;
        if tile.location(latitude, longitude) != Location::HasInterpolationNeighbors {
            return Err(Error::TileWithoutRequiredNeighborsSelected { latitude, longitude });
        }

        let tile = Arc::new(tile);
        if tiles.len() >= self.capacity {
            tiles.pop();
        }
        tiles.insert(0, Arc::clone(&tile));
        Ok(tile)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::SimpleTile;

    /// One-degree tiles aligned on integer degrees, with one extra row and
    /// column so neighboring tiles overlap and edge queries stay interior.
    struct DegreeUpdater {
        calls: AtomicUsize,
        samples: usize,
    }

    impl DegreeUpdater {
        fn new(samples: usize) -> Self {
            DegreeUpdater {
                calls: AtomicUsize::new(0),
                samples,
            }
        }
    }

    impl TileUpdater for DegreeUpdater {
        fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut dyn UpdatableTile) -> Result {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let size = 1f64.to_radians();
            let step = size / (self.samples as f64 - 1.0);
            let min_lat = (latitude / size).floor() * size;
            let min_lon = (longitude / size).floor() * size;
            tile.set_geometry(min_lat, min_lon, step, step, self.samples + 1, self.samples + 1)?;
            for i in 0..=self.samples {
                for j in 0..=self.samples {
                    tile.set_elevation(i, j, (i * 7 + j * 3) as f64)?;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn hit_does_not_call_updater_again() {
        let updater = Arc::new(DegreeUpdater::new(33));
        let cache: TileCache<SimpleTile> = TileCache::new(Arc::clone(&updater) as Arc<dyn TileUpdater>, 4);

        let lat = 0.5f64.to_radians();
        let lon = 0.5f64.to_radians();
        let first = cache.get_tile(lat, lon).unwrap();
        let second = cache.get_tile(lat, lon).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(updater.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn least_recently_used_tile_is_evicted() {
        let updater = Arc::new(DegreeUpdater::new(17));
        let cache: TileCache<SimpleTile> = TileCache::new(Arc::clone(&updater) as Arc<dyn TileUpdater>, 2);

        let spots = [(0.5, 0.5), (1.5, 0.5), (2.5, 0.5)];
        for (lat, lon) in spots {
            cache
                .get_tile(f64::to_radians(lat), f64::to_radians(lon))
                .unwrap();
        }
        assert_eq!(updater.calls.load(Ordering::Relaxed), 3);

        // the first tile was evicted by the third request
        cache.get_tile(0.5f64.to_radians(), 0.5f64.to_radians()).unwrap();
        assert_eq!(updater.calls.load(Ordering::Relaxed), 4);

        // the third one is still cached
        cache.get_tile(2.5f64.to_radians(), 0.5f64.to_radians()).unwrap();
        assert_eq!(updater.calls.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn corner_queries_are_served_by_a_covering_tile() {
        let updater = Arc::new(DegreeUpdater::new(17));
        let cache: TileCache<SimpleTile> = TileCache::new(updater as Arc<dyn TileUpdater>, 8);

        // exact degree corners fall in the interior of the tile anchored
        // just below them
        for (lat, lon) in [(1.0, 1.0), (1.0, 2.0), (2.0, 1.0), (2.0, 2.0)] {
            let tile = cache
                .get_tile(f64::to_radians(lat), f64::to_radians(lon))
                .unwrap();
            assert_eq!(
                tile.location(f64::to_radians(lat), f64::to_radians(lon)),
                Location::HasInterpolationNeighbors
            );
        }
    }

    struct EmptyUpdater;

    impl TileUpdater for EmptyUpdater {
        fn update_tile(&self, _latitude: f64, _longitude: f64, _tile: &mut dyn UpdatableTile) -> Result {
            Ok(())
        }
    }

    #[test]
    fn updater_without_data_is_reported() {
        let cache: TileCache<SimpleTile> = TileCache::new(Arc::new(EmptyUpdater), 2);
        assert!(matches!(
            cache.get_tile(0.1, 0.1),
            Err(Error::NoDemData { .. })
        ));
    }

    struct MisalignedUpdater;

    impl TileUpdater for MisalignedUpdater {
        fn update_tile(&self, _latitude: f64, _longitude: f64, tile: &mut dyn UpdatableTile) -> Result {
            // tile far away from the requested position
            tile.set_geometry(1.0, 1.0, 1.0e-4, 1.0e-4, 16, 16)?;
            for i in 0..16 {
                for j in 0..16 {
                    tile.set_elevation(i, j, 0.0)?;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn tile_not_covering_the_query_is_rejected() {
        let cache: TileCache<SimpleTile> = TileCache::new(Arc::new(MisalignedUpdater), 2);
        assert!(matches!(
            cache.get_tile(0.1, 0.1),
            Err(Error::TileWithoutRequiredNeighborsSelected { .. })
        ));
    }
}
