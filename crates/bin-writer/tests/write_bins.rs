//! Integration test: write sparse and dense bin files and read them back
//! with zarrs.

use std::path::Path;
use std::sync::Arc;

use bin_store::TemporalBinList;
use bin_writer::{
    BinFileFormat, BinFileMetadata, BinWriter, BinWriterConfig, WriterError, ZarrCompression,
    OUTPUT_BUFFER_LEN,
};
use binning_common::{PlanetaryGrid, SeaGrid, TemporalBin};
use test_utils::{create_temporal_bins, temp_test_dir, RegularGrid};
use zarrs::array::{Array, Element, ElementOwned};
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;

fn feature_names() -> Vec<String> {
    vec!["chl_mean".to_string()]
}

fn read_column<T: Element + ElementOwned>(path: &Path, array: &str) -> Vec<T> {
    let store = Arc::new(FilesystemStore::new(path).expect("Failed to open store"));
    let array = Array::open(store, array).expect("Failed to open array");
    array
        .retrieve_array_subset_elements::<T>(&array.subset_all())
        .expect("Failed to read array")
}

fn root_attributes(path: &Path) -> serde_json::Map<String, serde_json::Value> {
    let store = Arc::new(FilesystemStore::new(path).expect("Failed to open store"));
    Group::open(store, "/")
        .expect("Failed to open root group")
        .attributes()
        .clone()
}

fn write(
    grid: &dyn PlanetaryGrid,
    format: BinFileFormat,
    path: &Path,
    bins: Vec<TemporalBin>,
) -> Result<bin_writer::WriteSummary, WriterError> {
    let metadata = BinFileMetadata {
        super_sampling: 1,
        region: Some("POLYGON((-180 -90, 180 -90, 180 90, -180 90, -180 -90))".to_string()),
        ..Default::default()
    }
    .with_property("product_name", "L3_test");
    let writer = BinWriter::new(grid, feature_names(), metadata, BinWriterConfig::default());
    let mut source = bins;
    writer.write_to_path(format, path, &mut source)
}

#[test]
fn test_four_by_four_dense() {
    let dir = temp_test_dir("dense-");
    let path = dir.path().join("l3.zarr");
    let grid = RegularGrid::new(4, 4);

    let summary = write(&grid, BinFileFormat::Dense, &path, create_temporal_bins(&[1, 6, 14]))
        .expect("dense write");
    assert_eq!(summary.records, 16);
    assert_eq!(summary.bins, 3);

    let bin_num: Vec<u64> = read_column(&path, "/bin_list/bin_num");
    let nobs: Vec<u32> = read_column(&path, "/bin_list/nobs");
    let chl: Vec<f32> = read_column(&path, "/bin_list/chl_mean");
    assert_eq!(bin_num.len(), 16);

    // Rows are written last row first, cells ascending within a row
    assert_eq!(
        bin_num,
        vec![12, 13, 14, 15, 8, 9, 10, 11, 4, 5, 6, 7, 0, 1, 2, 3]
    );
    for (i, &index) in bin_num.iter().enumerate() {
        if [1, 6, 14].contains(&index) {
            assert_eq!(nobs[i], index as u32 + 1);
            assert_eq!(chl[i], index as f32);
        } else {
            assert_eq!(nobs[i], 0);
            assert!(chl[i].is_nan());
        }
    }
    assert_eq!(nobs.iter().filter(|&&n| n == 0).count(), 13);

    let max: Vec<i32> = read_column(&path, "/bin_index/max");
    assert_eq!(max, vec![4, 4, 4, 4]);
    let attrs = root_attributes(&path);
    assert_eq!(attrs["format"], "dense");
    assert_eq!(attrs["bin_list_dim"], 16);
    assert_eq!(attrs["bin_index_dim"], 4);
}

#[test]
fn test_four_by_four_sparse() {
    let dir = temp_test_dir("sparse-");
    let path = dir.path().join("l3.zarr");
    let grid = RegularGrid::new(4, 4);

    let summary = write(&grid, BinFileFormat::Sparse, &path, create_temporal_bins(&[1, 6, 14]))
        .expect("sparse write");
    assert_eq!(summary.records, 3);

    let bin_num: Vec<u64> = read_column(&path, "/bin_list/bin_num");
    assert_eq!(bin_num, vec![14, 6, 1]);

    let extent: Vec<i32> = read_column(&path, "/bin_index/extent");
    let begin: Vec<i64> = read_column(&path, "/bin_index/begin");
    let offset: Vec<i64> = read_column(&path, "/bin_index/offset");
    let start_num: Vec<i64> = read_column(&path, "/bin_index/start_num");
    assert_eq!(extent, vec![1, 1, 0, 1]);
    assert_eq!(begin, vec![1, 6, -1, 14]);
    assert_eq!(offset, vec![2, 1, 1, 0]);
    assert_eq!(start_num, vec![0, 4, 8, 12]);

    let hsize: Vec<f64> = read_column(&path, "/bin_index/hsize");
    let vsize: Vec<f64> = read_column(&path, "/bin_index/vsize");
    assert_eq!(hsize, vec![90.0; 4]);
    assert_eq!(vsize, vec![45.0; 4]);

    let attrs = root_attributes(&path);
    assert_eq!(attrs["product_name"], "L3_test");
    assert_eq!(attrs["super_sampling"], 1);
}

#[test]
fn test_sparse_extents_cover_list_without_overlap() {
    let dir = temp_test_dir("sparse-");
    let path = dir.path().join("l3.zarr");
    let grid = SeaGrid::new(90);

    // More bins than fit in one output buffer, scattered over many rows
    let indices: Vec<u64> = (0..grid.num_bins()).filter(|i| i % 3 != 1).collect();
    assert!(indices.len() > OUTPUT_BUFFER_LEN);
    let total = indices.len();

    let root = temp_test_dir("list-");
    let mut list = TemporalBinList::new(total as u64, Some(root.path())).unwrap();
    for bin in create_temporal_bins(&indices) {
        list.add(bin).unwrap();
    }

    let writer = BinWriter::new(
        &grid,
        feature_names(),
        BinFileMetadata::default(),
        BinWriterConfig {
            chunk_len: 100,
            compression: ZarrCompression::None,
            ..Default::default()
        },
    );
    writer
        .write_to_path(BinFileFormat::Sparse, &path, &mut list)
        .expect("sparse write");
    list.close().unwrap();

    let extent: Vec<i32> = read_column(&path, "/bin_index/extent");
    let offset: Vec<i64> = read_column(&path, "/bin_index/offset");
    assert_eq!(extent.iter().map(|&e| e as usize).sum::<usize>(), total);

    // Rows are laid out from the last row backwards without gaps or overlaps
    let mut expected_offset = 0i64;
    for row in (0..grid.num_rows()).rev() {
        assert_eq!(offset[row], expected_offset, "row {}", row);
        expected_offset += extent[row] as i64;
    }

    let bin_num: Vec<u64> = read_column(&path, "/bin_list/bin_num");
    assert_eq!(bin_num.len(), total);
    for row in 0..grid.num_rows() {
        let start = offset[row] as usize;
        let stored = &bin_num[start..start + extent[row] as usize];
        assert!(stored.windows(2).all(|w| w[0] < w[1]));
        assert!(stored.iter().all(|&i| grid.row_index(i) == row));
    }
}

#[test]
fn test_empty_sparse_source_is_rejected() {
    let dir = temp_test_dir("sparse-");
    let grid = RegularGrid::new(4, 4);
    let err = write(&grid, BinFileFormat::Sparse, &dir.path().join("l3.zarr"), vec![]).unwrap_err();
    assert!(matches!(err, WriterError::NoBins));
}

#[test]
fn test_unsorted_and_out_of_range_bins() {
    let dir = temp_test_dir("sparse-");
    let grid = RegularGrid::new(4, 4);

    let err = write(
        &grid,
        BinFileFormat::Sparse,
        &dir.path().join("a.zarr"),
        create_temporal_bins(&[3, 9, 5]),
    )
    .unwrap_err();
    assert!(matches!(err, WriterError::UnsortedBins { previous: 9, index: 5 }));

    let err = write(
        &grid,
        BinFileFormat::Dense,
        &dir.path().join("b.zarr"),
        create_temporal_bins(&[2, 2]),
    )
    .unwrap_err();
    assert!(matches!(err, WriterError::UnsortedBins { .. }));

    let err = write(
        &grid,
        BinFileFormat::Sparse,
        &dir.path().join("c.zarr"),
        create_temporal_bins(&[3, 16]),
    )
    .unwrap_err();
    assert!(matches!(err, WriterError::BinOutOfRange { index: 16, num_bins: 16 }));
}

#[test]
fn test_dense_rejects_huge_grid_before_writing() {
    let dir = temp_test_dir("dense-");
    let path = dir.path().join("l3.zarr");
    let grid = RegularGrid::new(50_000, 50_000);

    let err = write(&grid, BinFileFormat::Dense, &path, create_temporal_bins(&[1])).unwrap_err();
    assert!(matches!(err, WriterError::GridTooLarge { .. }));
    assert!(!path.exists());
}

#[test]
fn test_existing_bin_file_is_replaced() {
    let dir = temp_test_dir("replace-");
    let path = dir.path().join("l3.zarr");
    let grid = RegularGrid::new(4, 4);

    write(&grid, BinFileFormat::Sparse, &path, create_temporal_bins(&[1, 6, 14])).unwrap();
    write(&grid, BinFileFormat::Sparse, &path, create_temporal_bins(&[3])).unwrap();
    let bin_num: Vec<u64> = read_column(&path, "/bin_list/bin_num");
    assert_eq!(bin_num, vec![3]);

    let empty = dir.path().join("empty");
    std::fs::create_dir(&empty).unwrap();
    write(&grid, BinFileFormat::Sparse, &empty, create_temporal_bins(&[3])).unwrap();
    assert_eq!(root_attributes(&empty)["format"], "sparse");
}

#[test]
fn test_foreign_output_path_is_left_alone() {
    let dir = temp_test_dir("foreign-");
    let grid = RegularGrid::new(4, 4);

    let results = dir.path().join("results");
    std::fs::create_dir(&results).unwrap();
    std::fs::write(results.join("thesis.txt"), b"chapter 1").unwrap();
    let err = write(&grid, BinFileFormat::Sparse, &results, create_temporal_bins(&[1, 6, 14]))
        .unwrap_err();
    assert!(matches!(err, WriterError::Config(ref msg) if msg.contains("not a bin file")));
    assert_eq!(std::fs::read(results.join("thesis.txt")).unwrap(), b"chapter 1");

    let file = dir.path().join("notes.zarr");
    std::fs::write(&file, b"x").unwrap();
    let err = write(&grid, BinFileFormat::Sparse, &file, create_temporal_bins(&[1])).unwrap_err();
    assert!(matches!(err, WriterError::Config(_)));
    assert!(file.is_file());
}
