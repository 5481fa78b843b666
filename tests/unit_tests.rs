//! Unit tests for the subsetting engine, run against the in-memory container
//!
//! The memory container records every group write, so the writer's sequencing,
//! placement and deduplication can be checked without touching the filesystem.

use nc_subset::{
    config::WriteOptions,
    data_source::{ContainerSource, WriteMode},
    dataset::{ArrayValues, Attributes, DataArray, NativeChunking, VariablePath, VariableSpec},
    errors::{ErrorKind, SubsetError},
    memory::MemoryContainer,
    subset::{
        encoding::Filter, extract_dataset, HierarchicalWriter, Layout, Subsetter, WriterState,
    },
};
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;

fn f32_array(dims: &[(&str, usize)], start: f32) -> DataArray {
    let shape: Vec<usize> = dims.iter().map(|(_, len)| *len).collect();
    let count: usize = shape.iter().product();
    let data: Vec<f32> = (0..count).map(|i| start + i as f32).collect();
    let values = ArrayValues::F32(ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap());
    DataArray::new(values, dims.iter().map(|(d, _)| d.to_string()).collect()).unwrap()
}

fn i32_array(dims: &[(&str, usize)]) -> DataArray {
    let shape: Vec<usize> = dims.iter().map(|(_, len)| *len).collect();
    let count: usize = shape.iter().product();
    let values =
        ArrayValues::I32(ArrayD::from_shape_vec(IxDyn(&shape), (0..count as i32).collect()).unwrap());
    DataArray::new(values, dims.iter().map(|(d, _)| d.to_string()).collect()).unwrap()
}

/// A small TROPOMI-like granule: everything interesting lives under PRODUCT.
fn tropomi_granule() -> MemoryContainer {
    let mut attrs = Attributes::new();
    attrs.insert("title".to_string(), AttributeValue::Str("TROPOMI/S5P NO2".to_string()));
    attrs.insert("history".to_string(), AttributeValue::Str("2024-01-01 processed".to_string()));

    MemoryContainer::new("S5P_OFFL_L2__NO2.nc")
        .with_global_attrs(attrs)
        .with_variable("PRODUCT/time", i32_array(&[("time", 1)]))
        .with_variable("PRODUCT/scanline", i32_array(&[("scanline", 3)]))
        .with_variable("PRODUCT/ground_pixel", i32_array(&[("ground_pixel", 4)]))
        .with_variable(
            "PRODUCT/latitude",
            f32_array(&[("time", 1), ("scanline", 3), ("ground_pixel", 4)], -10.0),
        )
        .with_variable(
            "PRODUCT/longitude",
            f32_array(&[("time", 1), ("scanline", 3), ("ground_pixel", 4)], 100.0),
        )
        .with_variable(
            "PRODUCT/nitrogendioxide_tropospheric_column",
            f32_array(&[("time", 1), ("scanline", 3), ("ground_pixel", 4)], 0.5)
                .with_native_chunking(NativeChunking::regular(&[1, 3, 4], &[1, 2, 4])),
        )
        .with_variable(
            "PRODUCT/SUPPORT_DATA/GEOLOCATIONS/solar_zenith_angle",
            f32_array(&[("time", 1), ("scanline", 3), ("ground_pixel", 4)], 30.0),
        )
}

fn renamed_specs() -> Vec<VariableSpec> {
    VariableSpec::from_mapping([
        ("lat", "PRODUCT/latitude"),
        ("lon", "PRODUCT/longitude"),
        ("no2", "PRODUCT/nitrogendioxide_tropospheric_column"),
    ])
}

#[test]
fn test_list_paths_is_depth_first() {
    let granule = tropomi_granule();
    let paths: Vec<String> = granule
        .list_paths()
        .expect("Failed to list paths")
        .into_iter()
        .map(|p| p.to_string())
        .collect();
    assert_eq!(paths.first().map(String::as_str), Some("PRODUCT/time"));
    assert_eq!(
        paths.last().map(String::as_str),
        Some("PRODUCT/SUPPORT_DATA/GEOLOCATIONS/solar_zenith_angle")
    );
    assert_eq!(paths.len(), 7);
}

#[test]
fn test_extraction_skips_missing_variables() {
    let granule = tropomi_granule();
    let specs = VariableSpec::from_paths(["PRODUCT/latitude", "PRODUCT/does_not_exist"]);
    let dataset = extract_dataset(&granule, &specs).expect("Extraction failed");

    assert_eq!(dataset.len(), 1);
    assert!(dataset.contains("PRODUCT/latitude"));
    // Raw values come through untouched.
    let lat = dataset.get("PRODUCT/latitude").unwrap();
    assert_eq!(lat.source, VariablePath::new("PRODUCT/latitude"));
    assert_eq!(lat, &granule.read_variable(&"PRODUCT/latitude".into()).unwrap().with_source("PRODUCT/latitude".into()));
}

#[test]
fn test_tropomi_hierarchical_writes_single_product_group() {
    let granule = tropomi_granule();
    let mut subsetter = Subsetter::new("S5P_OFFL_L2__NO2.nc", renamed_specs()).unwrap();
    subsetter.extract_from(&granule).expect("Extraction failed");

    let mut out = MemoryContainer::new("out.nc");
    let options = WriteOptions {
        layout: Layout::Hierarchical,
        ..WriteOptions::default()
    };
    let summary = subsetter.write_to(&mut out, &options).expect("Write failed");

    assert_eq!(summary.groups, vec!["PRODUCT".to_string()]);
    assert_eq!(summary.variables_written, 3);
    assert_eq!(out.writes().len(), 1);
    assert_eq!(out.writes()[0].mode, WriteMode::Create);
    // No root group, so the single write carries the global attributes.
    assert!(out.writes()[0].with_global_attrs);
    assert_eq!(out.group_variables("PRODUCT"), vec!["lat", "lon", "no2"]);
    assert!(out.group_variables("").is_empty());
}

#[test]
fn test_tropomi_flat_matches_source_values() {
    let granule = tropomi_granule();
    let mut subsetter = Subsetter::new("S5P_OFFL_L2__NO2.nc", renamed_specs()).unwrap();
    subsetter.extract_from(&granule).expect("Extraction failed");

    let mut out = MemoryContainer::new("out.nc");
    let summary = subsetter
        .write_to(&mut out, &WriteOptions::default())
        .expect("Write failed");

    assert_eq!(summary.groups, vec![String::new()]);
    assert_eq!(out.group_variables(""), vec!["lat", "lon", "no2"]);
    for (name, path) in [
        ("lat", "PRODUCT/latitude"),
        ("lon", "PRODUCT/longitude"),
        ("no2", "PRODUCT/nitrogendioxide_tropospheric_column"),
    ] {
        let written = out.variable(name).expect("variable missing from output");
        let original = granule.read_variable(&VariablePath::new(path)).unwrap();
        assert_eq!(written.values, original.values);
        assert_eq!(written.dims, original.dims);
    }
}

#[test]
fn test_provenance_is_written_with_global_attributes() {
    let granule = tropomi_granule();
    let mut subsetter = Subsetter::new("S5P_OFFL_L2__NO2.nc", renamed_specs()).unwrap();
    subsetter.extract_from(&granule).unwrap();

    let mut out = MemoryContainer::new("out.nc");
    subsetter.write_to(&mut out, &WriteOptions::default()).unwrap();

    let attrs = out.attrs();
    assert_eq!(
        attrs.get("source_file"),
        Some(&AttributeValue::Str("S5P_OFFL_L2__NO2.nc".to_string()))
    );
    assert_eq!(attrs.get("Conventions"), Some(&AttributeValue::Str("CF-1.8".to_string())));
    assert_eq!(attrs.get("title"), Some(&AttributeValue::Str("TROPOMI/S5P NO2".to_string())));
    match attrs.get("history") {
        Some(AttributeValue::Str(history)) => {
            let lines: Vec<&str> = history.lines().collect();
            assert_eq!(lines.len(), 2);
            assert!(lines[0].contains("nc_subset"));
            assert_eq!(lines[1], "2024-01-01 processed");
        }
        other => panic!("unexpected history attribute: {other:?}"),
    }
}

#[test]
fn test_writer_sequences_create_then_append() {
    let source = MemoryContainer::new("in.nc")
        .with_variable("time", i32_array(&[("time", 2)]))
        .with_variable("PRODUCT/no2", f32_array(&[("time", 2), ("scanline", 3)], 0.0))
        .with_variable("PRODUCT/SUPPORT_DATA/sza", f32_array(&[("scanline", 3)], 0.0));
    let specs = VariableSpec::from_paths(["PRODUCT/no2", "time", "PRODUCT/SUPPORT_DATA/sza"]);
    let dataset = extract_dataset(&source, &specs).unwrap();

    let mut out = MemoryContainer::new("out.nc");
    let mut writer = HierarchicalWriter::new(&mut out);
    assert_eq!(writer.state(), WriterState::NotStarted);
    let options = WriteOptions {
        layout: Layout::Hierarchical,
        ..WriteOptions::default()
    };
    let summary = writer.write(&dataset, &options).expect("Write failed");
    assert_eq!(writer.state(), WriterState::Done);

    // Groups keep first-seen order.
    assert_eq!(summary.groups, vec!["PRODUCT", "", "PRODUCT/SUPPORT_DATA"]);

    // A second write through the same writer is refused.
    let err = writer.write(&dataset, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RuntimeOrder);

    let modes: Vec<WriteMode> = out.writes().iter().map(|w| w.mode).collect();
    assert_eq!(modes, vec![WriteMode::Create, WriteMode::Append, WriteMode::Append]);
    // Global attributes go with the root group, wherever it falls in the sequence.
    let with_attrs: Vec<&str> = out
        .writes()
        .iter()
        .filter(|w| w.with_global_attrs)
        .map(|w| w.group.as_str())
        .collect();
    assert_eq!(with_attrs, vec![""]);

    // The root coordinate's dimension is declared ahead of PRODUCT, which comes first.
    let root_dims: Vec<&[(String, usize)]> = out.writes().iter().map(|w| w.root_dims.as_slice()).collect();
    assert_eq!(root_dims[0], &[("time".to_string(), 2)]);
    assert!(root_dims[1..].iter().all(|dims| dims.is_empty()));
}

#[test]
fn test_dimension_coordinates_only_at_root() {
    let source = MemoryContainer::new("in.nc")
        .with_variable("time", i32_array(&[("time", 2)]))
        .with_variable("PRODUCT/scanline", i32_array(&[("scanline", 3)]))
        .with_variable("PRODUCT/no2", f32_array(&[("time", 2), ("scanline", 3)], 0.0));
    let specs = VariableSpec::from_paths(["time", "PRODUCT/scanline", "PRODUCT/no2"]);
    let dataset = extract_dataset(&source, &specs).unwrap();

    let mut out = MemoryContainer::new("out.nc");
    let options = WriteOptions {
        layout: Layout::Hierarchical,
        ..WriteOptions::default()
    };
    let summary = HierarchicalWriter::new(&mut out)
        .write(&dataset, &options)
        .expect("Write failed");

    assert_eq!(summary.stripped, vec!["PRODUCT/scanline".to_string()]);
    assert_eq!(out.group_variables(""), vec!["time"]);
    assert_eq!(out.group_variables("PRODUCT"), vec!["no2"]);
}

#[test]
fn test_only_stripped_variables_is_a_configuration_error() {
    let source = MemoryContainer::new("in.nc").with_variable("PRODUCT/scanline", i32_array(&[("scanline", 3)]));
    let dataset = extract_dataset(&source, &VariableSpec::from_paths(["PRODUCT/scanline"])).unwrap();

    let mut out = MemoryContainer::new("out.nc");
    let options = WriteOptions {
        layout: Layout::Hierarchical,
        ..WriteOptions::default()
    };
    let err = HierarchicalWriter::new(&mut out).write(&dataset, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(out.writes().is_empty());
}

#[test]
fn test_flat_collision_is_rejected_before_any_write() {
    let source = MemoryContainer::new("in.nc")
        .with_variable("A/value", f32_array(&[("x", 2)], 0.0))
        .with_variable("B/value", f32_array(&[("x", 2)], 5.0));
    let dataset = extract_dataset(&source, &VariableSpec::from_paths(["A/value", "B/value"])).unwrap();

    let mut out = MemoryContainer::new("out.nc");
    let err = HierarchicalWriter::new(&mut out)
        .write(&dataset, &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, SubsetError::Configuration(_)));
    assert!(out.writes().is_empty());

    // The same request keeps both in hierarchical mode.
    let options = WriteOptions {
        layout: Layout::Hierarchical,
        ..WriteOptions::default()
    };
    HierarchicalWriter::new(&mut out).write(&dataset, &options).unwrap();
    assert_eq!(out.group_variables("A"), vec!["value"]);
    assert_eq!(out.group_variables("B"), vec!["value"]);
}

#[test]
fn test_encoding_follows_native_chunks() {
    let granule = tropomi_granule();
    let mut subsetter = Subsetter::new("in.nc", renamed_specs()).unwrap();
    subsetter.extract_from(&granule).unwrap();

    let mut out = MemoryContainer::new("out.nc");
    subsetter.write_to(&mut out, &WriteOptions::default()).unwrap();

    let no2 = out.encoding("no2").expect("no2 should be encoded");
    assert_eq!(no2.filter, Filter::Deflate { level: 4 });
    assert!(no2.shuffle);
    assert_eq!(no2.chunk_shape, Some(vec![1, 2, 4]));
    // No native layout, no override: compression only.
    assert_eq!(out.encoding("lat").unwrap().chunk_shape, None);
}

#[test]
fn test_uncompressed_output_has_no_encodings() {
    let granule = tropomi_granule();
    let mut subsetter = Subsetter::new("in.nc", renamed_specs()).unwrap();
    subsetter.extract_from(&granule).unwrap();

    let mut out = MemoryContainer::new("out.nc");
    subsetter
        .write_to(&mut out, &WriteOptions::uncompressed(Layout::Flat))
        .unwrap();
    for name in ["lat", "lon", "no2"] {
        assert!(out.encoding(name).is_none());
    }
}

#[test]
fn test_failed_group_write_carries_group_path() {
    let source = MemoryContainer::new("in.nc")
        .with_variable("time", i32_array(&[("time", 2)]))
        .with_variable("PRODUCT/no2", f32_array(&[("time", 2)], 0.0));
    let dataset = extract_dataset(&source, &VariableSpec::from_paths(["time", "PRODUCT/no2"])).unwrap();

    let mut out = MemoryContainer::new("out.nc").fail_on_group("PRODUCT");
    let options = WriteOptions {
        layout: Layout::Hierarchical,
        ..WriteOptions::default()
    };
    let mut writer = HierarchicalWriter::new(&mut out);
    let err = writer.write(&dataset, &options).unwrap_err();
    assert_eq!(writer.state(), WriterState::FileCreated);

    assert_eq!(err.kind(), ErrorKind::Write);
    match err {
        SubsetError::Write { group, .. } => assert_eq!(group, "PRODUCT"),
        other => panic!("expected a write error, got {other:?}"),
    }
    // The root group made it to the output before the failure.
    assert_eq!(out.group_variables(""), vec!["time"]);
}

#[test]
fn test_write_before_extract_is_refused() {
    let subsetter = Subsetter::new("in.nc", renamed_specs()).unwrap();
    let mut out = MemoryContainer::new("out.nc");
    let err = subsetter
        .write_to(&mut out, &WriteOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RuntimeOrder);
    assert!(out.writes().is_empty());
}
