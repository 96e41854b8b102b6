//! End-to-end tests: SRTM tile on disk -> JSON corpus directory -> engine.
//!
//! Run with: `cargo test --test pipeline`
//! SQLite store tests need `--features persistence`.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use trail_matcher::{
    Difficulty, ElevationInput, ElevationRaster, EngineConfig, GpsPoint, InsufficientData,
    JsonDirCorpus, MemoryStore, TrailEngine, TrailError, Verdict,
};

const TILE_DIM: usize = 100;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write a 100x100 tile whose elevation rises 20 m per row southwards.
fn write_tile(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("N48E008.hgt");
    let bytes: Vec<u8> = (0..TILE_DIM)
        .flat_map(|row| (0..TILE_DIM).map(move |_| (row as i16) * 20))
        .flat_map(|sample| sample.to_be_bytes())
        .collect();
    std::fs::write(&path, bytes).expect("failed to write tile");
    path
}

fn query_track() -> Vec<GpsPoint> {
    (0..11)
        .map(|i| GpsPoint::new(48.405 + i as f64 * 0.001, 8.305))
        .collect()
}

/// Corpus with an exact twin of the query track and one unrelated wall.
fn write_corpus(dir: &Path, raster: &ElevationRaster) {
    let points = query_track();
    let elevations: Vec<f64> = points
        .iter()
        .map(|p| f64::from(raster.elevation_at_point(p).unwrap()))
        .collect();
    let coords: Vec<[f64; 2]> = points.iter().map(|p| [p.latitude, p.longitude]).collect();

    let bucket = json!({
        "twin": {
            "points": coords,
            "elevations": elevations,
            "label": "Intermediate"
        },
        "wall": [[80.0, 85.0, -80.0, -85.0], "Very Difficult"],
        "odd": [[0.0], "Extreme"]
    });
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("0.json"), bucket.to_string()).unwrap();
}

struct Fixture {
    _tmp: TempDir,
    tile: std::path::PathBuf,
    corpus_dir: std::path::PathBuf,
}

fn fixture() -> Fixture {
    init_logging();
    let tmp = TempDir::new().expect("failed to create temp dir");
    let tile = write_tile(tmp.path());
    let raster = ElevationRaster::load_hgt(&tile).unwrap();
    let corpus_dir = tmp.path().join("corpus");
    write_corpus(&corpus_dir, &raster);
    Fixture {
        _tmp: tmp,
        tile,
        corpus_dir,
    }
}

fn engine(fx: &Fixture) -> TrailEngine {
    let corpus = JsonDirCorpus::new(&fx.corpus_dir).unwrap();
    let mut engine = TrailEngine::new(EngineConfig::default(), corpus).unwrap();
    engine.add_raster(ElevationRaster::load_hgt(&fx.tile).unwrap());
    engine
}

#[test]
fn test_tile_loads_with_origin_from_name() {
    let fx = fixture();
    let raster = ElevationRaster::load_hgt(&fx.tile).unwrap();
    assert_eq!(raster.dim(), TILE_DIM);
    assert_eq!(raster.bounds().max_lat, 49.0);
    assert_eq!(raster.bounds().min_lng, 8.0);
    assert_eq!(raster.elevation_at(48.995, 8.5).unwrap(), 0);
    assert_eq!(raster.elevation_at(48.005, 8.5).unwrap(), 99 * 20);
}

#[test]
fn test_classifies_like_its_twin() {
    let fx = fixture();
    let engine = engine(&fx);
    let verdict = engine
        .classify(&query_track(), ElevationInput::FromRaster, 1, 1)
        .unwrap();
    assert_eq!(verdict.label(), Some(Difficulty::Intermediate));
}

#[test]
fn test_similar_tracks_put_twin_first() {
    let fx = fixture();
    let engine = engine(&fx);
    let similar = engine
        .similar_tracks(&query_track(), ElevationInput::FromRaster, 5, 2)
        .unwrap();
    // The entry with an unknown label is dropped from the bucket
    assert_eq!(similar.len(), 2);
    assert_eq!(similar[0].id, "twin");
    assert_eq!(similar[0].score, 1.0);

    let lsh = engine
        .similar_tracks_lsh(&query_track(), ElevationInput::FromRaster, 2)
        .unwrap();
    assert!(lsh.contains(&"twin".to_string()));
}

#[test]
fn test_missing_bucket_file_means_no_references() {
    let fx = fixture();
    let engine = engine(&fx);
    // ~7.8 km falls in bucket 1, which has no file
    let long: Vec<GpsPoint> = (0..71)
        .map(|i| GpsPoint::new(48.2 + i as f64 * 0.001, 8.305))
        .collect();
    assert_eq!(
        engine.classify(&long, ElevationInput::FromRaster, 3, 1).unwrap(),
        Verdict::InsufficientData(InsufficientData::NoReferenceTracks)
    );
}

#[test]
fn test_track_outside_tile() {
    let fx = fixture();
    let engine = engine(&fx);
    let outside: Vec<GpsPoint> = query_track()
        .into_iter()
        .map(|p| GpsPoint::new(p.latitude + 2.0, p.longitude))
        .collect();
    assert!(matches!(
        engine.classify(&outside, ElevationInput::FromRaster, 1, 1),
        Err(TrailError::NoRasterCoverage)
    ));
}

#[test]
fn test_missing_corpus_dir() {
    let fx = fixture();
    assert!(matches!(
        JsonDirCorpus::new(fx.corpus_dir.join("missing")),
        Err(TrailError::CorpusNotFound { .. })
    ));
}

#[test]
fn test_shared_store_skips_corpus() {
    let fx = fixture();
    let store = Arc::new(MemoryStore::new());

    let first = engine(&fx).with_store(store.clone());
    let verdict = first
        .classify(&query_track(), ElevationInput::FromRaster, 1, 1)
        .unwrap();
    assert_eq!(first.stats().source_loads, 1);

    // Remove the corpus file; the store still has the shingled bucket
    std::fs::remove_file(fx.corpus_dir.join("0.json")).unwrap();
    let second = engine(&fx).with_store(store);
    let again = second
        .classify(&query_track(), ElevationInput::FromRaster, 1, 1)
        .unwrap();
    assert_eq!(again, verdict);
    assert_eq!(second.stats().store_loads, 1);
    assert_eq!(second.stats().source_loads, 0);
}

#[cfg(feature = "persistence")]
#[test]
fn test_sqlite_store_across_sessions() {
    use trail_matcher::SqliteStore;

    let fx = fixture();
    let db_path = fx.corpus_dir.join("signatures.db");

    {
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        let engine = engine(&fx).with_store(store);
        engine
            .classify(&query_track(), ElevationInput::FromRaster, 1, 1)
            .unwrap();
    }

    std::fs::remove_file(fx.corpus_dir.join("0.json")).unwrap();
    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let engine = engine(&fx).with_store(store);
    let verdict = engine
        .classify(&query_track(), ElevationInput::FromRaster, 1, 1)
        .unwrap();
    assert_eq!(verdict.label(), Some(Difficulty::Intermediate));
    assert_eq!(engine.stats().store_loads, 1);
}
