//! Global attributes of a bin file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Provenance and coverage of a binning run, stored on the root group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinFileMetadata {
    pub time_coverage_start: Option<DateTime<Utc>>,
    pub time_coverage_end: Option<DateTime<Utc>>,
    /// Region as WKT polygon.
    pub region: Option<String>,
    pub super_sampling: u32,
    /// Free-form properties (product name, software version, ...).
    pub properties: BTreeMap<String, String>,
}

impl BinFileMetadata {
    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Attributes of the root group.
    pub(crate) fn to_attributes(
        &self,
        format: &str,
        num_rows: usize,
        num_records: u64,
        feature_names: &[String],
    ) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("format".to_string(), json!(format));
        attrs.insert("bin_index_dim".to_string(), json!(num_rows));
        attrs.insert("bin_list_dim".to_string(), json!(num_records));
        attrs.insert("feature_names".to_string(), json!(feature_names));
        attrs.insert("super_sampling".to_string(), json!(self.super_sampling));
        if let Some(start) = self.time_coverage_start {
            attrs.insert("time_coverage_start".to_string(), json!(start.to_rfc3339()));
        }
        if let Some(end) = self.time_coverage_end {
            attrs.insert("time_coverage_end".to_string(), json!(end.to_rfc3339()));
        }
        if let Some(region) = &self.region {
            attrs.insert("region".to_string(), json!(region));
        }
        for (key, value) in &self.properties {
            attrs.insert(key.clone(), json!(value));
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_attributes() {
        let metadata = BinFileMetadata {
            time_coverage_start: Some(Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap()),
            time_coverage_end: None,
            region: Some("POLYGON((0 0, 1 0, 1 1, 0 0))".to_string()),
            super_sampling: 3,
            properties: BTreeMap::new(),
        }
        .with_property("product_name", "L3_test");

        let attrs = metadata.to_attributes("sparse", 4, 3, &["chl_mean".to_string()]);
        assert_eq!(attrs["bin_index_dim"], json!(4));
        assert_eq!(attrs["bin_list_dim"], json!(3));
        assert_eq!(attrs["super_sampling"], json!(3));
        assert_eq!(attrs["product_name"], json!("L3_test"));
        assert_eq!(attrs["time_coverage_start"], json!("2010-01-01T00:00:00+00:00"));
        assert!(!attrs.contains_key("time_coverage_end"));
    }
}
