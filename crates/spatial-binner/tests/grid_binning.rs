//! Bin in-memory products onto a coarse 4x4 grid.
//!
//! The fixture product has 4x4 pixels of 30 degrees starting at (80N, 170W),
//! so its pixel centers fall into bins 0, 1, 4, 5, 8 and 9.

use bin_store::{GeneralSpatialBinCollector, MemorySpatialBinCollector};
use binning_common::{Aggregator, MeanAggregator};
use spatial_binner::{GridObservationBinner, ProductBinner, ProductBinnerConfig};
use test_utils::{assert_approx_eq, create_constant_grid, temp_test_dir, MemoryProduct, RegularGrid};

fn product(name: &str, value: f32) -> MemoryProduct {
    MemoryProduct::new(name, 4, 4)
        .with_geo_coding(80.0, -170.0, 30.0)
        .with_band("chl", create_constant_grid(4, 4, value))
}

#[test]
fn test_pixels_land_in_expected_bins() {
    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(vec!["chl".to_string()]);
    let collector = MemorySpatialBinCollector::new();
    let observation_binner = GridObservationBinner::new(&grid, &aggregator, &collector);
    let binner = ProductBinner::new(
        &observation_binner,
        aggregator.variable_names().to_vec(),
        ProductBinnerConfig::default(),
    );

    let observations = binner.process_product(&product("p1", 2.0)).unwrap();
    assert_eq!(observations, 16);

    let (bins, distinct) = collector.drain();
    assert_eq!(distinct, 6);
    let counts: Vec<(u64, u32)> = bins.iter().map(|b| (b.index, b.num_obs)).collect();
    assert_eq!(counts, vec![(0, 3), (1, 1), (4, 6), (5, 2), (8, 3), (9, 1)]);
}

#[test]
fn test_super_sampling_multiplies_observations() {
    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(vec!["chl".to_string()]);
    let collector = MemorySpatialBinCollector::new();
    let observation_binner = GridObservationBinner::new(&grid, &aggregator, &collector);
    let config = ProductBinnerConfig {
        super_sampling: 3,
        ..Default::default()
    };
    let binner = ProductBinner::new(&observation_binner, vec!["chl".to_string()], config);

    assert_eq!(binner.process_product(&product("p1", 2.0)).unwrap(), 16 * 9);
    let (bins, _) = collector.drain();
    assert_eq!(bins.iter().map(|b| b.num_obs as u64).sum::<u64>(), 16 * 9);
}

#[test]
fn test_two_products_merge_temporally() {
    let grid = RegularGrid::new(4, 4);
    let aggregator = MeanAggregator::new(vec!["chl".to_string()]);
    let scratch = temp_test_dir("spatial-");
    let collector = GeneralSpatialBinCollector::with_spill_threshold(16, Some(scratch.path()), 2)
        .unwrap();
    let observation_binner = GridObservationBinner::new(&grid, &aggregator, &collector);
    let binner = ProductBinner::new(
        &observation_binner,
        vec!["chl".to_string()],
        ProductBinnerConfig {
            slice_height: Some(1),
            ..Default::default()
        },
    );

    binner.process_product(&product("p1", 1.0)).unwrap();
    binner.process_product(&product("p2", 3.0)).unwrap();
    assert!(collector.spill_count() > 0);

    let collection = collector.complete().unwrap();
    let mut temporal = Vec::new();
    for group in collection.into_groups() {
        let (index, spatial_bins) = group.unwrap();
        temporal.push(aggregator.temporal_bin(index, &spatial_bins));
    }

    let indices: Vec<u64> = temporal.iter().map(|b| b.index).collect();
    assert_eq!(indices, vec![0, 1, 4, 5, 8, 9]);
    for bin in &temporal {
        // Every cell was seen by both products, once per slice row
        assert!(bin.num_passes >= 2);
        assert_approx_eq!(bin.features[0], 2.0, 1e-6);
    }
    assert_eq!(temporal.iter().map(|b| b.num_obs).sum::<u32>(), 32);
}
