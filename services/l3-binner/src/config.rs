//! Run configuration.
//!
//! Loaded from YAML with `${VAR}` / `${VAR:-default}` substitution, then
//! overridden by `L3_*` environment variables:
//!
//! ```yaml
//! sources: ["/data/modis/2003-01"]
//! variables: [chl]
//! num_rows: 2160
//! super_sampling: 3
//! region: "POLYGON((-4 51, 9 51, 9 61, -4 61, -4 51))"
//! start_date: "2003-01-01"
//! end_date: "2003-01-02"
//! use_spatial_data_day: true
//! min_data_hour: 5.0
//! output:
//!   path: /data/l3/chl-2003-01-01.zarr
//!   format: sparse
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bin_writer::{BinFileFormat, BinWriterConfig, DENSE_RECORD_LIMIT};
use binning_common::{parse_date_utc, DataPeriod, PlanetaryGrid, Polygon, SeaGrid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spatial_binner::ProductBinnerConfig;

/// Where and how the bin file is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub format: BinFileFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("l3-bins.zarr"),
            format: BinFileFormat::Sparse,
        }
    }
}

/// Configuration of one binning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningRunConfig {
    /// Zarr product directories, or directories searched for `*.zarr`.
    pub sources: Vec<PathBuf>,
    /// Variables (bands) to aggregate.
    pub variables: Vec<String>,
    /// Rows of the global grid.
    pub num_rows: usize,
    pub super_sampling: u32,
    pub slice_height: Option<usize>,
    pub mask_band: Option<String>,
    /// Region as WKT polygon; the union of product footprints if absent.
    pub region: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Filter products by spatial data-day instead of plain time range.
    pub use_spatial_data_day: bool,
    /// Hour of the day (local solar time) at which a data day begins.
    pub min_data_hour: f64,
    /// Length of a data-day period in days; defaults to the date range.
    pub period_duration: Option<f64>,
    pub output: OutputConfig,
    pub writer: BinWriterConfig,
    /// Parent directory for scratch files; the system temp dir if absent.
    pub scratch_dir: Option<PathBuf>,
    /// Extra global attributes of the bin file.
    pub properties: BTreeMap<String, String>,
}

impl Default for BinningRunConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            variables: Vec::new(),
            num_rows: SeaGrid::DEFAULT_NUM_ROWS,
            super_sampling: 1,
            slice_height: None,
            mask_band: None,
            region: None,
            start_date: None,
            end_date: None,
            use_spatial_data_day: false,
            min_data_hour: 0.0,
            period_duration: None,
            output: OutputConfig::default(),
            writer: BinWriterConfig::default(),
            scratch_dir: None,
            properties: BTreeMap::new(),
        }
    }
}

impl BinningRunConfig {
    /// Load a YAML file, apply environment overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read run config from {:?}", path.as_ref()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse run config from {:?}", path.as_ref()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML content after environment variable substitution.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Override settings from `L3_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("L3_OUTPUT_PATH") {
            self.output.path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("L3_OUTPUT_FORMAT") {
            self.output.format = BinFileFormat::from_str(&val)
                .with_context(|| format!("Invalid L3_OUTPUT_FORMAT '{}'", val))?;
        }
        if let Ok(val) = std::env::var("L3_SLICE_HEIGHT") {
            self.slice_height = Some(
                val.parse()
                    .with_context(|| format!("Invalid L3_SLICE_HEIGHT '{}'", val))?,
            );
        }
        if let Ok(val) = std::env::var("L3_SUPER_SAMPLING") {
            self.super_sampling = val
                .parse()
                .with_context(|| format!("Invalid L3_SUPER_SAMPLING '{}'", val))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let start = self.start_time()?;
        let end = self.end_time()?;
        if let (Some(start), Some(end)) = (start, end) {
            anyhow::ensure!(
                end >= start,
                "Parameter 'end_date={}' is before 'start_date={}'",
                self.end_date.as_deref().unwrap_or_default(),
                self.start_date.as_deref().unwrap_or_default()
            );
        }
        if self.use_spatial_data_day {
            anyhow::ensure!(
                start.is_some() && end.is_some(),
                "If 'use_spatial_data_day' is set then 'start_date' and 'end_date' must be given"
            );
        }
        anyhow::ensure!(
            self.num_rows > 2,
            "Parameter 'num_rows' must be greater than 2"
        );
        if self.output.format == BinFileFormat::Dense {
            let num_bins = SeaGrid::new(self.num_rows).num_bins();
            anyhow::ensure!(
                num_bins <= DENSE_RECORD_LIMIT,
                "Grid with {} rows has {} bins, more than the dense format can hold ({}); use format 'sparse'",
                self.num_rows,
                num_bins,
                DENSE_RECORD_LIMIT
            );
        }
        anyhow::ensure!(
            !self.variables.is_empty(),
            "Run config does not define any variable"
        );
        anyhow::ensure!(
            !self.sources.is_empty(),
            "Parameter 'sources' must list at least one path"
        );
        if let Some(duration) = self.period_duration {
            anyhow::ensure!(duration > 0.0, "Parameter 'period_duration' must be positive");
        }
        self.region_polygon()?;
        self.writer
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid writer config: {}", e))?;
        Ok(())
    }

    pub fn start_time(&self) -> Result<Option<DateTime<Utc>>> {
        parse_optional_date("start date", self.start_date.as_deref())
    }

    pub fn end_time(&self) -> Result<Option<DateTime<Utc>>> {
        parse_optional_date("end date", self.end_date.as_deref())
    }

    pub fn region_polygon(&self) -> Result<Option<Polygon>> {
        self.region
            .as_deref()
            .map(|wkt| Polygon::parse_wkt(wkt).with_context(|| format!("Invalid region '{}'", wkt)))
            .transpose()
    }

    /// The data-day period, if spatial data-day filtering is enabled.
    pub fn data_period(&self) -> Result<Option<DataPeriod>> {
        if !self.use_spatial_data_day {
            return Ok(None);
        }
        let (start, end) = match (self.start_time()?, self.end_time()?) {
            (Some(start), Some(end)) => (start, end),
            _ => anyhow::bail!("Spatial data-day filtering needs 'start_date' and 'end_date'"),
        };
        let duration = self
            .period_duration
            .unwrap_or_else(|| (end - start).num_seconds() as f64 / 86_400.0);
        Ok(Some(DataPeriod::new(start, duration, self.min_data_hour)))
    }

    pub fn binner_config(&self) -> ProductBinnerConfig {
        ProductBinnerConfig {
            slice_height: self.slice_height,
            super_sampling: self.super_sampling,
            mask_band: self.mask_band.clone(),
        }
    }
}

fn parse_optional_date(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            parse_date_utc(s)
                .with_context(|| format!("Error while parsing {} parameter '{}'", name, s))
        })
        .transpose()
}

/// Expand `${VAR}` and `${VAR:-default}` in YAML content.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .with_context(|| format!("Unclosed variable substitution: ${{{}", after))?;
        result.push_str(&resolve_var_expr(&after[..end])?);
        rest = &after[end + 1..];
    }
    result.push_str(rest);

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}
