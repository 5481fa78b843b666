//! Defines command-line interface options using `clap` for nc-subset.

use crate::config::{load_variable_specs, validate_specs, WriteOptions};
use crate::dataset::VariableSpec;
use crate::errors::Result;
use crate::subset::encoding::{ChunkOverrides, CompressionKind};
use crate::subset::groups::Layout;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;

/// Extract variables from hierarchical NetCDF4/HDF5 files into compact subsets
#[derive(Parser, Debug)]
#[command(name = "nc-subset", version, about)]
pub struct Args {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every variable path in a file, depth-first
    List {
        /// Path to the NetCDF file
        file: PathBuf,
    },
    /// Extract variables from one file
    Extract(ExtractArgs),
    /// Extract the same variables from many files in parallel
    Batch(BatchArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Path to the NetCDF file
    pub file: PathBuf,

    #[command(flatten)]
    pub subset: SubsetArgs,

    /// Output file name. Defaults to <stem>_SUB<ext>
    #[arg(long)]
    pub output_name: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct BatchArgs {
    /// Input files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub subset: SubsetArgs,

    /// Number of parallel workers. Defaults to number of CPU cores.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Run each file in its own process or in a worker thread
    #[arg(long, value_enum, default_value_t = Isolation::Process)]
    pub isolation: Isolation,

    /// Write a JSON report of the batch to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    Process,
    Thread,
}

/// Options shared by `extract` and `batch`
#[derive(clap::Args, Debug, Clone)]
pub struct SubsetArgs {
    /// Variable to extract, formatted as <name>=<path> or just <path>. Repeatable.
    #[arg(long = "var", value_parser = parse_var_arg)]
    pub vars: Vec<(String, String)>,

    /// JSON file with a list of paths or a {name: path} object
    #[arg(long)]
    pub vars_file: Option<PathBuf>,

    /// Directory for output files, created if missing
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Keep each variable in its source group instead of flattening to root
    #[arg(long)]
    pub preserve_groups: bool,

    /// Compression: none, deflate (zlib), gzip, lzf or szip
    #[arg(long, default_value = "deflate")]
    pub compression: String,

    /// Compression level, 0-9
    #[arg(long, default_value_t = 4)]
    pub level: u8,

    /// Disable the shuffle filter
    #[arg(long)]
    pub no_shuffle: bool,

    /// Store a checksum with every chunk
    #[arg(long)]
    pub checksum: bool,

    /// Chunk size override, formatted as <name>:<dim>=<size>. Repeatable.
    #[arg(long = "chunk", value_parser = parse_chunk_arg)]
    pub chunks: Vec<ChunkArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkArg {
    pub variable: String,
    pub dimension: String,
    pub size: usize,
}

impl SubsetArgs {
    /// Requested variables: the spec file first, then `--var` entries.
    pub fn specs(&self) -> Result<Vec<VariableSpec>> {
        let mut specs = match &self.vars_file {
            Some(path) => load_variable_specs(path)?,
            None => Vec::new(),
        };
        specs.extend(
            self.vars
                .iter()
                .map(|(name, path)| VariableSpec::new(name.clone(), path)),
        );
        validate_specs(&specs)?;
        Ok(specs)
    }

    pub fn write_options(&self) -> Result<WriteOptions> {
        let compression: CompressionKind = self.compression.parse()?;
        let mut chunk_overrides = ChunkOverrides::new();
        for chunk in &self.chunks {
            chunk_overrides
                .entry(chunk.variable.clone())
                .or_default()
                .insert(chunk.dimension.clone(), chunk.size);
        }
        let options = WriteOptions {
            layout: if self.preserve_groups {
                Layout::Hierarchical
            } else {
                Layout::Flat
            },
            compression,
            level: self.level,
            shuffle: !self.no_shuffle,
            checksum: self.checksum,
            chunk_overrides,
        };
        // Surface a bad level here rather than inside a worker.
        options.planner()?;
        Ok(options)
    }

    /// The same options as command-line arguments, for re-invoking `extract`.
    pub fn to_cli_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        for (name, path) in &self.vars {
            args.push("--var".into());
            args.push(format!("{name}={path}").into());
        }
        if let Some(path) = &self.vars_file {
            args.push("--vars-file".into());
            args.push(path.into());
        }
        args.push("--output-dir".into());
        args.push(self.output_dir.clone().into());
        if self.preserve_groups {
            args.push("--preserve-groups".into());
        }
        args.push("--compression".into());
        args.push(self.compression.clone().into());
        args.push("--level".into());
        args.push(self.level.to_string().into());
        if self.no_shuffle {
            args.push("--no-shuffle".into());
        }
        if self.checksum {
            args.push("--checksum".into());
        }
        for chunk in &self.chunks {
            args.push("--chunk".into());
            args.push(format!("{}:{}={}", chunk.variable, chunk.dimension, chunk.size).into());
        }
        args
    }
}

fn parse_var_arg(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), path.to_string()))
        }
        Some(_) => Err("Invalid format: Expected '<name>=<path>'.".to_string()),
        None if !s.trim_matches('/').is_empty() => {
            let path = s.trim_matches('/');
            Ok((path.to_string(), path.to_string()))
        }
        None => Err("Variable path must not be empty".to_string()),
    }
}

fn parse_chunk_arg(s: &str) -> std::result::Result<ChunkArg, String> {
    let (variable, rest) = s
        .rsplit_once(':')
        .ok_or_else(|| "Invalid format: Expected '<name>:<dim>=<size>'.".to_string())?;
    let (dimension, size) = rest
        .split_once('=')
        .ok_or_else(|| "Invalid format: Expected '<name>:<dim>=<size>'.".to_string())?;
    if variable.is_empty() || dimension.is_empty() {
        return Err("Invalid format: Expected '<name>:<dim>=<size>'.".to_string());
    }
    let size = size
        .parse::<usize>()
        .map_err(|_| format!("Invalid chunk size for dimension '{dimension}'"))?;
    Ok(ChunkArg {
        variable: variable.to_string(),
        dimension: dimension.to_string(),
        size,
    })
}
