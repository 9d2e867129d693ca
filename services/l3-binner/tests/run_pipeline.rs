//! End-to-end binning runs over in-memory and Zarr products.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use bin_writer::BinFileFormat;
use binning_common::{parse_date_utc, GeoCoding, MeanAggregator, SourceProduct};
use l3_binner::{find_products, BinningRun, BinningRunConfig, ZarrProduct};
use serde_json::json;
use test_utils::{create_constant_grid, create_test_grid, temp_test_dir, MemoryProduct, RegularGrid};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

/// 4x4 pixels of 30 degrees from (80N, 170W): bins 0, 1, 4, 5, 8, 9 of a 4x4 grid.
fn product(name: &str, value: f32, start: &str, end: &str) -> MemoryProduct {
    MemoryProduct::new(name, 4, 4)
        .with_geo_coding(80.0, -170.0, 30.0)
        .with_times(Some(parse_date_utc(start).unwrap()), Some(parse_date_utc(end).unwrap()))
        .with_band("chl", create_constant_grid(4, 4, value))
}

fn run_config(dir: &Path) -> BinningRunConfig {
    let mut config = BinningRunConfig::default();
    config.sources = vec![dir.to_path_buf()];
    config.variables = vec!["chl".to_string()];
    config.num_rows = 4;
    config.output.path = dir.join("l3.zarr");
    config.scratch_dir = Some(dir.to_path_buf());
    config
        .properties
        .insert("project".to_string(), "test".to_string());
    config
}

fn read_column<T>(path: &Path, name: &str) -> Vec<T>
where
    T: zarrs::array::Element + zarrs::array::ElementOwned,
{
    let store = Arc::new(FilesystemStore::new(path).unwrap());
    let array = Array::open(store, name).unwrap();
    array
        .retrieve_array_subset_elements::<T>(&array.subset_all())
        .unwrap()
}

#[test]
fn test_run_filters_bins_and_writes() {
    let dir = temp_test_dir("l3-run-");
    let mut config = run_config(dir.path());
    config.start_date = Some("2003-01-01".to_string());
    config.end_date = Some("2003-01-02".to_string());
    config.validate().unwrap();

    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(config.variables.clone());
    let products: Vec<Result<MemoryProduct>> = vec![
        Ok(product("p1", 1.0, "2003-01-01 10:00:00", "2003-01-01 10:05:00")),
        Ok(MemoryProduct::new("no-geo", 4, 4).with_band("chl", create_constant_grid(4, 4, 9.0))),
        Ok(product("p2", 3.0, "2003-01-01 12:00:00", "2003-01-01 12:05:00")),
        Ok(product("late", 9.0, "2003-01-05 10:00:00", "2003-01-05 10:05:00")),
        Err(anyhow::anyhow!("truncated file")),
    ];

    let summary = BinningRun::new(&config, &grid, &aggregator)
        .run(products)
        .unwrap();

    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.observations, 32);
    assert_eq!(summary.bins_written, 6);
    let reasons: Vec<&str> = summary.rejected.iter().map(|(_, r)| r.as_str()).collect();
    assert_eq!(reasons.len(), 3);
    assert_eq!(summary.rejected[0].0, "no-geo");
    assert_eq!(reasons[0], "does not contain a geo-coding");
    assert_eq!(reasons[1], "does not match the time range.");
    assert!(reasons[2].contains("truncated file"));

    let output = summary.output.unwrap();
    let bin_num: Vec<u64> = read_column(&output, "/bin_list/bin_num");
    assert_eq!(bin_num, vec![8, 9, 4, 5, 0, 1]);
    let mean: Vec<f32> = read_column(&output, "/bin_list/chl_mean");
    assert!(mean.iter().all(|&m| (m - 2.0).abs() < 1e-6));
    let extent: Vec<i32> = read_column(&output, "/bin_index/extent");
    assert_eq!(extent, vec![2, 2, 2, 0]);

    let store = Arc::new(FilesystemStore::new(&output).unwrap());
    let attrs = Group::open(store, "/").unwrap().attributes().clone();
    assert_eq!(attrs["format"], "sparse");
    assert_eq!(attrs["feature_names"], json!(["chl_mean", "chl_sigma"]));
    assert_eq!(attrs["time_coverage_start"], "2003-01-01T00:00:00+00:00");
    assert_eq!(attrs["source_products"], "p1,p2");
    assert_eq!(attrs["project"], "test");
    // Footprint of the pixel centers
    assert_eq!(
        attrs["region"],
        "POLYGON((-155 65, -65 65, -65 -25, -155 -25, -155 65))"
    );
}

#[test]
fn test_dense_run_uses_product_times() {
    let dir = temp_test_dir("l3-run-");
    let mut config = run_config(dir.path());
    config.output.format = BinFileFormat::Dense;

    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(config.variables.clone());
    let products: Vec<Result<MemoryProduct>> = vec![
        Ok(product("p1", 1.0, "2003-01-01 10:00:00", "2003-01-01 10:05:00")),
        Ok(product("p2", 1.0, "2003-01-03 08:00:00", "2003-01-03 08:05:00")),
    ];

    let summary = BinningRun::new(&config, &grid, &aggregator)
        .run(products)
        .unwrap();
    assert_eq!(summary.bins_written, 16);

    let output = summary.output.unwrap();
    let nobs: Vec<u32> = read_column(&output, "/bin_list/nobs");
    assert_eq!(nobs.iter().filter(|&&n| n > 0).count(), 6);

    let store = Arc::new(FilesystemStore::new(&output).unwrap());
    let attrs = Group::open(store, "/").unwrap().attributes().clone();
    assert_eq!(attrs["time_coverage_start"], "2003-01-01T10:00:00+00:00");
    assert_eq!(attrs["time_coverage_end"], "2003-01-03T08:05:00+00:00");
}

#[test]
fn test_no_bins_writes_nothing() {
    let dir = temp_test_dir("l3-run-");
    let config = run_config(dir.path());
    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(config.variables.clone());

    let products = vec![Ok(MemoryProduct::new("no-geo", 2, 2))];
    let summary = BinningRun::new(&config, &grid, &aggregator)
        .run(products)
        .unwrap();

    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.rejected.len(), 1);
    assert!(summary.output.is_none());
    assert!(!config.output.path.exists());
}

fn assert_empty_dir(path: &Path) {
    let entries: Vec<_> = std::fs::read_dir(path).unwrap().collect();
    assert!(entries.is_empty(), "{:?} still holds {} entries", path, entries.len());
}

#[test]
fn test_cancelled_run_fails() {
    let dir = temp_test_dir("l3-run-");
    let mut config = run_config(dir.path());
    let scratch = dir.path().join("scratch");
    config.scratch_dir = Some(scratch.clone());
    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(config.variables.clone());
    let cancelled = AtomicBool::new(true);

    let products = vec![Ok(product("p1", 1.0, "2003-01-01", "2003-01-01"))];
    let err = BinningRun::new(&config, &grid, &aggregator)
        .with_cancel_flag(&cancelled)
        .run(products)
        .unwrap_err();
    assert!(err.to_string().contains("cancelled"));
    assert_empty_dir(&scratch);
}

#[test]
fn test_failed_write_removes_scratch_dirs() {
    let dir = temp_test_dir("l3-run-");
    let mut config = run_config(dir.path());
    let scratch = dir.path().join("scratch");
    config.scratch_dir = Some(scratch.clone());
    config.output.path = dir.path().join("taken.zarr");
    std::fs::write(&config.output.path, b"not a bin file").unwrap();
    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(config.variables.clone());

    let products = vec![Ok(product("p1", 1.0, "2003-01-01", "2003-01-01"))];
    let err = BinningRun::new(&config, &grid, &aggregator)
        .run(products)
        .unwrap_err();
    assert!(format!("{:#}", err).contains("not a bin file"));
    assert_empty_dir(&scratch);
    assert_eq!(std::fs::read(&config.output.path).unwrap(), b"not a bin file");
}

/// Write a 6x4 product with an affine geo-coding and 2x3 chunks.
fn write_zarr_product(path: &Path) {
    std::fs::create_dir_all(path).unwrap();
    let store = Arc::new(FilesystemStore::new(path).unwrap());

    let mut attrs = serde_json::Map::new();
    attrs.insert("product_name".to_string(), json!("zarr-scene"));
    attrs.insert("start_time".to_string(), json!("2003-01-01T10:00:00Z"));
    attrs.insert("end_time".to_string(), json!("2003-01-01 10:05:00"));
    attrs.insert("bands".to_string(), json!(["chl"]));
    attrs.insert(
        "geo_transform".to_string(),
        json!({"lat0": 50.0, "lon0": 0.0, "dlat": 0.5, "dlon": 0.5}),
    );
    GroupBuilder::new()
        .attributes(attrs)
        .build(store.clone(), "/")
        .unwrap()
        .store_metadata()
        .unwrap();

    let array = ArrayBuilder::new(
        vec![4, 6],
        DataType::Float32,
        vec![2u64, 3].try_into().unwrap(),
        FillValue::from(f32::NAN),
    )
    .build(store, "/chl")
    .unwrap();
    array.store_metadata().unwrap();
    let subset = ArraySubset::new_with_start_shape(vec![0, 0], vec![4, 6]).unwrap();
    array
        .store_array_subset_elements(&subset, &create_test_grid(6, 4))
        .unwrap();
}

#[test]
fn test_zarr_product_adapter() {
    let dir = temp_test_dir("l3-zarr-");
    let nested = dir.path().join("2003").join("scene.zarr");
    write_zarr_product(&nested);

    let found = find_products(&[dir.path().to_path_buf()]);
    assert_eq!(found, vec![nested.clone()]);

    let product = ZarrProduct::open(&nested).unwrap();
    assert_eq!(product.name(), "zarr-scene");
    assert_eq!((product.width(), product.height()), (6, 4));
    assert!(product.start_time().unwrap() < product.end_time().unwrap());

    let pos = product.geo_coding().unwrap().geo_pos(1.0, 2.0).unwrap();
    assert_eq!((pos.lat, pos.lon), (49.0, 0.5));

    let raster = product.raster("chl").unwrap();
    assert_eq!(raster.tile_size(), Some((3, 2)));
    let window = raster
        .read_window(&binning_common::PixelWindow::new(2, 1, 2, 2))
        .unwrap();
    let expected = create_test_grid(6, 4);
    assert_eq!(window, vec![expected[8], expected[9], expected[14], expected[15]]);
    assert!(product.raster("sst").is_none());
}

/// 2x2 product with per-pixel positions whose edge path folds back on
/// itself: (10N, 170W), (10N, 80W), no position, (10N, 170W).
fn write_folded_product(path: &Path) {
    std::fs::create_dir_all(path).unwrap();
    let store = Arc::new(FilesystemStore::new(path).unwrap());

    let mut attrs = serde_json::Map::new();
    attrs.insert("product_name".to_string(), json!("folded"));
    attrs.insert("bands".to_string(), json!(["chl", "lat", "lon"]));
    attrs.insert("lat_band".to_string(), json!("lat"));
    attrs.insert("lon_band".to_string(), json!("lon"));
    GroupBuilder::new()
        .attributes(attrs)
        .build(store.clone(), "/")
        .unwrap()
        .store_metadata()
        .unwrap();

    let bands: [(&str, Vec<f32>); 3] = [
        ("chl", vec![1.0, 1.0, 1.0, 1.0]),
        ("lat", vec![10.0, 10.0, f32::NAN, 10.0]),
        ("lon", vec![-170.0, -80.0, f32::NAN, -170.0]),
    ];
    for (name, values) in bands {
        let array = ArrayBuilder::new(
            vec![2, 2],
            DataType::Float32,
            vec![2u64, 2].try_into().unwrap(),
            FillValue::from(f32::NAN),
        )
        .build(store.clone(), &format!("/{}", name))
        .unwrap();
        array.store_metadata().unwrap();
        let subset = ArraySubset::new_with_start_shape(vec![0, 0], vec![2, 2]).unwrap();
        array.store_array_subset_elements(&subset, &values).unwrap();
    }
}

#[test]
fn test_unusable_footprint_does_not_abort_run() {
    let dir = temp_test_dir("l3-run-");
    let config = run_config(dir.path());
    let path = dir.path().join("folded.zarr");
    write_folded_product(&path);

    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(config.variables.clone());
    let products = vec![ZarrProduct::open(&path)];
    let summary = BinningRun::new(&config, &grid, &aggregator)
        .run(products)
        .unwrap();

    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.observations, 3);
    assert!(summary.bins_written > 0);
    assert!(summary.output.is_some());
}
