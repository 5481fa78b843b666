//! Extraction pipeline
//!
//! Reads the requested variables out of a source container into a [`Dataset`],
//! then hands it to a [`HierarchicalWriter`]. [`Subsetter`] keeps the extracted
//! dataset around so it can be written several times.

use super::writer::{HierarchicalWriter, WriteSummary};
use crate::config::{validate_specs, WriteOptions};
use crate::data_source::{ContainerSink, ContainerSource};
use crate::dataset::{Dataset, Provenance, VariableSpec};
use crate::errors::{Result, SubsetError};
use crate::netcdf_io::{NetcdfSink, NetcdfSource};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Suffix inserted before the extension of default output names
pub const SUBSET_SUFFIX: &str = "_SUB";

/// Read every requested variable from `source`.
///
/// Variables that cannot be found, or whose storage type is not supported, are
/// skipped with a warning. Any other read failure aborts the extraction. Global
/// attributes of the source are carried over unchanged.
pub fn extract_dataset<S: ContainerSource + ?Sized>(
    source: &S,
    specs: &[VariableSpec],
) -> Result<Dataset> {
    validate_specs(specs)?;
    let mut dataset = Dataset::with_attrs(source.global_attributes()?);

    for spec in specs {
        match source.read_variable(&spec.source_path) {
            Ok(array) => {
                dataset.insert(
                    spec.output_name.clone(),
                    array.with_source(spec.source_path.clone()),
                );
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    source = %source.identifier(),
                    variable = %spec.source_path,
                    "⚠ Skipping variable: {e}"
                );
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        source = %source.identifier(),
        requested = specs.len(),
        extracted = dataset.len(),
        "extracted variables"
    );
    Ok(dataset)
}

/// Default output file name: `<stem>_SUB<ext>`, or `custom` when given.
pub fn subset_output_name(input: &Path, custom: Option<&str>) -> String {
    if let Some(name) = custom {
        return name.to_string();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    match input.extension() {
        Some(ext) => format!("{stem}{SUBSET_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{SUBSET_SUFFIX}"),
    }
}

/// Create `dir` and its parents; succeeds when it already exists.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Extract once, write many
#[derive(Debug, Clone)]
pub struct Subsetter {
    input: PathBuf,
    specs: Vec<VariableSpec>,
    dataset: Option<Dataset>,
}

impl Subsetter {
    pub fn new(input: impl Into<PathBuf>, specs: Vec<VariableSpec>) -> Result<Self> {
        validate_specs(&specs)?;
        Ok(Self {
            input: input.into(),
            specs,
            dataset: None,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn specs(&self) -> &[VariableSpec] {
        &self.specs
    }

    /// The extracted dataset, once [`Subsetter::extract`] has run
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// Open the input as NetCDF and extract from it.
    pub fn extract(&mut self) -> Result<&Dataset> {
        let source = NetcdfSource::open_for_read(&self.input)?;
        self.extract_from(&source)
    }

    /// Extract from an already opened source; provenance names that source.
    pub fn extract_from<S: ContainerSource + ?Sized>(&mut self, source: &S) -> Result<&Dataset> {
        let mut dataset = extract_dataset(source, &self.specs)?;
        dataset.append_provenance(&Provenance::new(source.identifier()));
        Ok(self.dataset.insert(dataset))
    }

    /// Write the extracted dataset into `sink`.
    pub fn write_to<K: ContainerSink>(&self, sink: &mut K, options: &WriteOptions) -> Result<WriteSummary> {
        let dataset = self.extracted()?;
        HierarchicalWriter::new(sink).write(dataset, options)
    }

    /// Write the extracted dataset as a NetCDF4 file in `output_dir`.
    pub fn to_netcdf(
        &self,
        output_dir: &Path,
        output_name: Option<&str>,
        options: &WriteOptions,
    ) -> Result<WriteSummary> {
        self.extracted()?;
        ensure_output_dir(output_dir)?;
        let output_path = output_dir.join(subset_output_name(&self.input, output_name));
        let mut sink = NetcdfSink::new(output_path);
        self.write_to(&mut sink, options)
    }

    fn extracted(&self) -> Result<&Dataset> {
        self.dataset.as_ref().ok_or_else(|| {
            SubsetError::RuntimeOrder(format!(
                "extract() must run before writing a subset of {}",
                self.input.display()
            ))
        })
    }
}

/// Fixed arguments shared by every item of a batch
#[derive(Debug, Clone)]
pub struct ExtractJob {
    pub specs: Vec<VariableSpec>,
    pub output_dir: PathBuf,
    /// Custom file name; only meaningful for a single input
    pub output_name: Option<String>,
    pub options: WriteOptions,
}

impl ExtractJob {
    /// Where the subset of `input` is written
    pub fn output_path(&self, input: &Path) -> PathBuf {
        self.output_dir
            .join(subset_output_name(input, self.output_name.as_deref()))
    }

    /// Fail when two inputs would write the same output file.
    pub fn check_distinct_outputs(&self, inputs: &[PathBuf]) -> Result<()> {
        let mut seen: HashMap<PathBuf, &Path> = HashMap::with_capacity(inputs.len());
        for input in inputs {
            if let Some(other) = seen.insert(self.output_path(input), input) {
                return Err(SubsetError::config(format!(
                    "{} and {} would both be written to {}",
                    other.display(),
                    input.display(),
                    self.output_path(input).display()
                )));
            }
        }
        Ok(())
    }
}

/// Full pipeline for one input file: open, extract, write.
pub fn extract_and_write(input: &Path, job: &ExtractJob) -> Result<WriteSummary> {
    let mut subsetter = Subsetter::new(input, job.specs.clone())?;
    subsetter.extract()?;
    subsetter.to_netcdf(&job.output_dir, job.output_name.as_deref(), &job.options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn default_output_name_keeps_extension() {
        assert_eq!(
            subset_output_name(Path::new("/data/S5P_L2_NO2.nc"), None),
            "S5P_L2_NO2_SUB.nc"
        );
        assert_eq!(subset_output_name(Path::new("granule"), None), "granule_SUB");
        assert_eq!(subset_output_name(Path::new("a.nc"), Some("b.nc")), "b.nc");
    }

    #[test]
    fn writing_before_extract_is_an_order_error() {
        let subsetter = Subsetter::new("missing.nc", VariableSpec::from_paths(["x"])).unwrap();
        let dir = std::env::temp_dir();
        let err = subsetter
            .to_netcdf(&dir, None, &WriteOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuntimeOrder);
    }

    #[test]
    fn batch_inputs_must_map_to_distinct_outputs() {
        let job = ExtractJob {
            specs: VariableSpec::from_paths(["x"]),
            output_dir: PathBuf::from("/out"),
            output_name: None,
            options: WriteOptions::default(),
        };
        assert_eq!(job.output_path(Path::new("/a/g.nc")), PathBuf::from("/out/g_SUB.nc"));
        job.check_distinct_outputs(&[PathBuf::from("/a/g1.nc"), PathBuf::from("/a/g2.nc")])
            .unwrap();

        let err = job
            .check_distinct_outputs(&[PathBuf::from("/a/g.nc"), PathBuf::from("/b/g.nc")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("g_SUB.nc"));
    }

    #[test]
    fn missing_input_is_not_found() {
        let mut subsetter = Subsetter::new("/nonexistent/input.nc", VariableSpec::from_paths(["x"])).unwrap();
        let err = subsetter.extract().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(subsetter.dataset().is_none());
    }
}
