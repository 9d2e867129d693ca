//! Filter chain nodes and their predicates.

use binning_common::{
    geo_boundary, DataPeriod, PeriodMembership, Polygon, SourceProduct, TimeRange,
};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Edge pixel step used when tracing a product footprint.
pub const DEFAULT_BOUNDARY_STEP: usize = 16;

/// Predicate evaluated by one node of a filter chain.
#[derive(Debug, Clone)]
pub enum FilterKind {
    /// The product has a geo-coding able to provide positions.
    GeoCoding,
    /// The product footprint intersects the region.
    Region {
        region: Polygon,
        boundary_step: usize,
    },
    /// The product acquisition time matches the range.
    TimeRange(TimeRange),
    /// The product corners are not all outside the spatial data-day period.
    DataDay(DataPeriod),
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::GeoCoding => "geo-coding",
            FilterKind::Region { .. } => "region",
            FilterKind::TimeRange(_) => "time-range",
            FilterKind::DataDay(_) => "data-day",
        }
    }

    /// Evaluate this predicate alone. Returns the rejection reason.
    fn check(&self, product: &dyn SourceProduct) -> Option<String> {
        match self {
            FilterKind::GeoCoding => match product.geo_coding() {
                None => Some("does not contain a geo-coding".to_string()),
                Some(gc) if !gc.can_get_geo_pos() => {
                    Some("geo-coding cannot provide geo-positions".to_string())
                }
                Some(_) => None,
            },
            FilterKind::Region {
                region,
                boundary_step,
            } => {
                let intersects = geo_boundary(product, *boundary_step)
                    .and_then(|boundary| Polygon::from_geo_positions(&boundary).ok())
                    .map_or(false, |footprint| footprint.intersects(region));
                if intersects {
                    None
                } else {
                    Some("does not intersect the region".to_string())
                }
            }
            FilterKind::TimeRange(range) => {
                if range.matches(product.start_time(), product.end_time()) {
                    None
                } else {
                    Some("does not match the time range.".to_string())
                }
            }
            FilterKind::DataDay(period) => check_data_day(period, product),
        }
    }
}

fn check_data_day(period: &DataPeriod, product: &dyn SourceProduct) -> Option<String> {
    let (start, end) = match (product.start_time(), product.end_time()) {
        (Some(start), Some(end)) => (start, end),
        _ => return Some("does not contain time information".to_string()),
    };
    let geo_coding = match product.geo_coding() {
        Some(gc) => gc,
        None => return Some("does not contain a geo-coding".to_string()),
    };

    let w = product.width() as f64;
    let h = product.height() as f64;
    // Top corners were seen at the start time, bottom corners at the end time
    let corners = [
        (0.5, 0.5, start),
        (w - 0.5, 0.5, start),
        (0.5, h - 0.5, end),
        (w - 0.5, h - 0.5, end),
    ];
    let memberships: Vec<PeriodMembership> = corners
        .iter()
        .filter_map(|&(x, y, time)| {
            geo_coding
                .geo_pos(x, y)
                .filter(|pos| pos.is_valid())
                .map(|pos| period.membership(pos.lon, time))
        })
        .collect();

    if memberships.is_empty() {
        return Some("geo-coding cannot provide geo-positions".to_string());
    }
    let all = |m: PeriodMembership| memberships.iter().all(|&c| c == m);
    if all(PeriodMembership::Previous) || all(PeriodMembership::Subsequent) {
        Some("is outside the data-day period".to_string())
    } else {
        None
    }
}

/// One node of a filter chain.
///
/// The chain is owned from the outermost filter; each node holds its
/// parent. [`accept`](Self::accept) evaluates the chain root first.
#[derive(Debug, Clone)]
pub struct ProductFilter {
    kind: FilterKind,
    parent: Option<Box<ProductFilter>>,
    reason: Option<String>,
}

impl ProductFilter {
    /// A filter without parent.
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            parent: None,
            reason: None,
        }
    }

    /// Chain a new filter behind this one.
    pub fn then(self, kind: FilterKind) -> Self {
        Self {
            kind,
            parent: Some(Box::new(self)),
            reason: None,
        }
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<&ProductFilter> {
        self.parent.as_deref()
    }

    /// Reason of the last rejection, `None` after an accepted product.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Kind names from the root to this filter.
    pub fn chain_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.nodes().map(|node| node.kind.name()).collect();
        names.reverse();
        names
    }

    /// This node followed by its ancestors.
    fn nodes(&self) -> impl Iterator<Item = &ProductFilter> {
        std::iter::successors(Some(self), |node| node.parent.as_deref())
    }

    /// Decide whether `product` takes part in the run.
    ///
    /// On rejection every node from the rejecting one down to this filter
    /// records the reason, so a child reports its parent's reason.
    pub fn accept(&mut self, product: &dyn SourceProduct) -> bool {
        let mut kinds: Vec<&FilterKind> = self.nodes().map(|node| &node.kind).collect();
        kinds.reverse();

        let rejection = kinds
            .iter()
            .enumerate()
            .find_map(|(depth, kind)| kind.check(product).map(|reason| (depth, kind.name(), reason)));
        let depth = kinds.len();

        let (rejected_at, reason) = match rejection {
            Some((at, filter, reason)) => {
                debug!(product = product.name(), filter, reason = %reason, "Product rejected");
                (at, Some(reason))
            }
            None => (depth, None),
        };

        // Walk from this node (deepest) to the root, assigning reasons
        let mut node = Some(self);
        let mut level = depth;
        while let Some(current) = node {
            level -= 1;
            current.reason = if level >= rejected_at {
                reason.clone()
            } else {
                None
            };
            node = current.parent.as_deref_mut();
        }

        reason.is_none()
    }
}

/// Build the standard filter chain of a binning run.
///
/// Geo-coding first, then either the data-day filter (if a period is
/// given) or a time-range filter (if any bound is given), then the region
/// filter.
pub fn create_source_product_filter(
    data_period: Option<DataPeriod>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    region: Option<Polygon>,
) -> ProductFilter {
    let mut filter = ProductFilter::new(FilterKind::GeoCoding);
    if let Some(period) = data_period {
        filter = filter.then(FilterKind::DataDay(period));
    } else if start.is_some() || end.is_some() {
        filter = filter.then(FilterKind::TimeRange(TimeRange::new(start, end)));
    }
    if let Some(region) = region {
        filter = filter.then(FilterKind::Region {
            region,
            boundary_step: DEFAULT_BOUNDARY_STEP,
        });
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use binning_common::parse_date_utc;
    use test_utils::{region, MemoryProduct};

    fn utc(s: &str) -> DateTime<Utc> {
        parse_date_utc(s).unwrap()
    }

    #[test]
    fn test_geo_coding_filter() {
        let mut filter = ProductFilter::new(FilterKind::GeoCoding);

        assert!(!filter.accept(&MemoryProduct::new("none", 4, 4)));
        assert_eq!(filter.reason(), Some("does not contain a geo-coding"));

        let unusable = MemoryProduct::new("unusable", 4, 4).with_unusable_geo_coding();
        assert!(!filter.accept(&unusable));
        assert_eq!(filter.reason(), Some("geo-coding cannot provide geo-positions"));

        let good = MemoryProduct::new("good", 4, 4).with_geo_coding(10.0, 10.0, 0.1);
        assert!(filter.accept(&good));
        assert_eq!(filter.reason(), None);
    }

    #[test]
    fn test_child_reports_parent_reason() {
        let region = Polygon::parse_wkt(region::GLOBAL).unwrap();
        let mut filter = create_source_product_filter(None, None, None, Some(region));

        assert!(!filter.accept(&MemoryProduct::new("no-gc", 4, 4)));
        assert_eq!(filter.reason(), Some("does not contain a geo-coding"));
        assert_eq!(
            filter.parent().and_then(|p| p.reason()),
            Some("does not contain a geo-coding")
        );
    }

    #[test]
    fn test_region_filter() {
        let north_sea = Polygon::parse_wkt(region::NORTH_SEA).unwrap();
        let mut filter = create_source_product_filter(None, None, None, Some(north_sea));

        // 20 x 20 pixels of 0.1 degrees from (56N, 2E)
        let inside = MemoryProduct::new("inside", 20, 20).with_geo_coding(56.0, 2.0, 0.1);
        assert!(filter.accept(&inside));

        let pacific = MemoryProduct::new("pacific", 20, 20).with_geo_coding(-40.0, -140.0, 0.1);
        assert!(!filter.accept(&pacific));
        assert_eq!(filter.reason(), Some("does not intersect the region"));
        // The geo-coding parent accepted
        assert_eq!(filter.parent().and_then(|p| p.reason()), None);
    }

    #[test]
    fn test_time_range_filter() {
        let start = utc("2003-01-01");
        let end = utc("2003-01-10");
        let mut filter = create_source_product_filter(None, Some(start), Some(end), None);
        assert!(matches!(filter.kind(), FilterKind::TimeRange(_)));

        let product = |s: Option<&str>, e: Option<&str>| {
            MemoryProduct::new("p", 4, 4)
                .with_geo_coding(0.0, 0.0, 1.0)
                .with_times(s.map(utc), e.map(utc))
        };

        assert!(filter.accept(&product(None, None)));
        assert!(filter.accept(&product(Some("2003-01-05"), Some("2003-01-06"))));
        assert!(filter.accept(&product(Some("2002-12-31"), Some("2003-01-02"))));
        assert!(filter.accept(&product(Some("2003-01-09"), None)));
        assert!(filter.accept(&product(None, Some("2003-01-01"))));

        assert!(!filter.accept(&product(Some("2003-01-11"), Some("2003-01-12"))));
        assert_eq!(filter.reason(), Some("does not match the time range."));
        assert!(!filter.accept(&product(Some("2002-12-30"), None)));
        assert_eq!(filter.reason(), Some("does not match the time range."));
        assert!(!filter.accept(&product(Some("2003-01-11"), None)));
        assert_eq!(filter.reason(), Some("does not match the time range."));
        assert!(!filter.accept(&product(None, Some("2003-01-11"))));
        assert_eq!(filter.reason(), Some("does not match the time range."));

        assert!(filter.accept(&product(Some("2003-01-09"), None)));
        assert_eq!(filter.reason(), None);
    }

    #[test]
    fn test_open_time_range() {
        let mut filter =
            create_source_product_filter(None, Some(utc("2003-01-01")), None, None);
        let late = MemoryProduct::new("late", 4, 4)
            .with_geo_coding(0.0, 0.0, 1.0)
            .with_times(Some(utc("2030-01-01")), Some(utc("2030-01-02")));
        assert!(filter.accept(&late));

        let early = MemoryProduct::new("early", 4, 4)
            .with_geo_coding(0.0, 0.0, 1.0)
            .with_times(Some(utc("2002-01-01")), Some(utc("2002-01-02")));
        assert!(!filter.accept(&early));
    }

    #[test]
    fn test_chain_composition() {
        let period = DataPeriod::new(utc("2003-01-01"), 1.0, 0.0);
        let region = Polygon::parse_wkt(region::GLOBAL).unwrap();

        let filter = create_source_product_filter(Some(period), None, None, None);
        assert_eq!(filter.chain_names(), vec!["geo-coding", "data-day"]);

        // The data-day filter takes precedence over explicit dates
        let filter = create_source_product_filter(
            Some(period),
            Some(utc("2003-01-01")),
            Some(utc("2003-01-02")),
            Some(region),
        );
        assert_eq!(filter.chain_names(), vec!["geo-coding", "data-day", "region"]);

        let filter = create_source_product_filter(None, None, None, None);
        assert_eq!(filter.chain_names(), vec!["geo-coding"]);
        assert!(filter.parent().is_none());
    }

    #[test]
    fn test_data_day_requires_times() {
        let period = DataPeriod::new(utc("2003-01-01"), 1.0, 0.0);
        let mut filter = create_source_product_filter(Some(period), None, None, None);
        let product = MemoryProduct::new("timeless", 4, 4).with_geo_coding(0.0, 0.0, 1.0);
        assert!(!filter.accept(&product));
        assert_eq!(filter.reason(), Some("does not contain time information"));
    }
}
