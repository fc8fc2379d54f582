//! Normalized statistic bundles and the dashboard snapshot that carries them.
//!
//! Every aggregation produces a [`StatBundle`]; every transport (embedded
//! payload, SSE push, polling endpoint) carries a [`DashboardSnapshot`].
//! Legacy wire shapes are normalized into these types at the transport
//! boundary (see `reconcile::adapter`) and nowhere else.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current bundle layout version.
pub const BUNDLE_VERSION: u32 = 1;

/// The seven dashboard statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatName {
    OrderStatus,
    DeliverySplit,
    TopProducts,
    Administrations,
    UserDeliveries,
    OrderTrend,
    Summary,
}

impl StatName {
    pub const ALL: [StatName; 7] = [
        StatName::OrderStatus,
        StatName::DeliverySplit,
        StatName::TopProducts,
        StatName::Administrations,
        StatName::UserDeliveries,
        StatName::OrderTrend,
        StatName::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatName::OrderStatus => "order_status",
            StatName::DeliverySplit => "delivery_split",
            StatName::TopProducts => "top_products",
            StatName::Administrations => "administrations",
            StatName::UserDeliveries => "user_deliveries",
            StatName::OrderTrend => "order_trend",
            StatName::Summary => "summary",
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            StatName::OrderStatus => DataType::Status,
            StatName::DeliverySplit => DataType::Delivery,
            StatName::TopProducts => DataType::Product,
            StatName::Administrations => DataType::Administration,
            StatName::UserDeliveries => DataType::User,
            StatName::OrderTrend => DataType::Trend,
            StatName::Summary => DataType::Summary,
        }
    }

    /// Name of the single series carried by this statistic's bundle.
    pub fn series_name(&self) -> &'static str {
        match self {
            StatName::OrderStatus | StatName::OrderTrend | StatName::Summary => "orders",
            StatName::DeliverySplit => "orders",
            StatName::TopProducts => "quantity",
            StatName::Administrations | StatName::UserDeliveries => "delivered_orders",
        }
    }

    /// Whether the statistic's labels come from grouping values in the data
    /// (as opposed to a fixed label set).
    pub fn is_distribution(&self) -> bool {
        matches!(
            self,
            StatName::TopProducts | StatName::Administrations | StatName::UserDeliveries
        )
    }
}

impl fmt::Display for StatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatName::ALL
            .into_iter()
            .find(|stat| stat.as_str() == s)
            .ok_or_else(|| format!("unknown statistic: {s}"))
    }
}

/// Kind of chart data a bundle carries, serialized as `data_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Status,
    Delivery,
    Product,
    Administration,
    User,
    Trend,
    Summary,
}

/// Where a bundle's numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleSource {
    Database,
    DefaultDepartments,
    ErrorFallback,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub data: Vec<i64>,
}

/// Record-level backing data for drill-down views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailRecord {
    Administration {
        administration: String,
        delivered_orders: i64,
    },
    User {
        user: String,
        delivered_orders: i64,
    },
    Product {
        product: String,
        quantity: i64,
    },
}

impl DetailRecord {
    pub fn label(&self) -> &str {
        match self {
            DetailRecord::Administration { administration, .. } => administration,
            DetailRecord::User { user, .. } => user,
            DetailRecord::Product { product, .. } => product,
        }
    }

    pub fn value(&self) -> i64 {
        match self {
            DetailRecord::Administration {
                delivered_orders, ..
            }
            | DetailRecord::User {
                delivered_orders, ..
            } => *delivered_orders,
            DetailRecord::Product { quantity, .. } => *quantity,
        }
    }
}

/// One aggregate result. Immutable once returned: a refresh builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatBundle {
    pub name: StatName,
    pub version: u32,
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    #[serde(rename = "all_data", default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<DetailRecord>,
    pub data_type: DataType,
    pub is_real_data: bool,
    pub source: BundleSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub fingerprint: String,
}

impl StatBundle {
    /// Bundle of values measured from the store.
    pub fn measured(name: StatName, labels: Vec<String>, values: Vec<i64>) -> Self {
        Self::build(name, labels, values, true, BundleSource::Database)
    }

    /// Zero-valued bundle standing in for a failed aggregation.
    pub fn error_fallback(name: StatName, labels: Vec<String>, error: impl Into<String>) -> Self {
        let zeros = vec![0; labels.len()];
        let mut bundle = Self::build(name, labels, zeros, false, BundleSource::ErrorFallback);
        bundle.error = Some(error.into());
        bundle
    }

    /// Placeholder administration distribution shown when no valid label survives.
    pub fn default_departments(departments: &[&str]) -> Self {
        let labels: Vec<String> = departments.iter().map(|d| d.to_string()).collect();
        let zeros = vec![0; labels.len()];
        let mut bundle = Self::build(
            StatName::Administrations,
            labels,
            zeros,
            false,
            BundleSource::DefaultDepartments,
        );
        bundle.details = departments
            .iter()
            .map(|d| DetailRecord::Administration {
                administration: d.to_string(),
                delivered_orders: 0,
            })
            .collect();
        bundle.sealed()
    }

    /// Client-side placeholder used when no transport delivered data in time.
    pub fn synthetic(name: StatName, labels: Vec<String>, values: Vec<i64>) -> Self {
        Self::build(name, labels, values, false, BundleSource::Synthetic)
    }

    fn build(
        name: StatName,
        labels: Vec<String>,
        values: Vec<i64>,
        is_real_data: bool,
        source: BundleSource,
    ) -> Self {
        let bundle = Self {
            name,
            version: BUNDLE_VERSION,
            labels,
            series: vec![Series {
                name: name.series_name().to_string(),
                data: values,
            }],
            details: Vec::new(),
            data_type: name.data_type(),
            is_real_data,
            source,
            error: None,
            fingerprint: String::new(),
        };
        bundle.sealed()
    }

    /// Attach the full detail list and reseal.
    pub fn with_details(mut self, details: Vec<DetailRecord>) -> Self {
        self.details = details;
        self.sealed()
    }

    /// Recompute the content fingerprint after labels, series, or details changed.
    pub fn sealed(mut self) -> Self {
        self.fingerprint = self.compute_fingerprint();
        self
    }

    /// SHA-256 over name, labels, series values, and details, hex-encoded.
    pub fn compute_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_str().as_bytes());
        for label in &self.labels {
            hasher.update([0x1f]);
            hasher.update(label.as_bytes());
        }
        for series in &self.series {
            hasher.update([0x1e]);
            hasher.update(series.name.as_bytes());
            for value in &series.data {
                hasher.update(value.to_le_bytes());
            }
        }
        for record in &self.details {
            hasher.update([0x1d]);
            hasher.update(record.label().as_bytes());
            hasher.update(record.value().to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Values of the first series.
    pub fn values(&self) -> &[i64] {
        self.series.first().map(|s| s.data.as_slice()).unwrap_or(&[])
    }

    /// Value for a label in the first series.
    pub fn value_of(&self, label: &str) -> Option<i64> {
        let idx = self.labels.iter().position(|l| l == label)?;
        self.values().get(idx).copied()
    }

    /// Label/value pairs of the first series, in bundle order.
    pub fn pairs(&self) -> Vec<(String, i64)> {
        self.labels
            .iter()
            .cloned()
            .zip(self.values().iter().copied())
            .collect()
    }

    pub fn is_error(&self) -> bool {
        self.source == BundleSource::ErrorFallback
    }
}

/// Every statistic bundle plus generation metadata. This is the JSON shape of
/// the polling endpoint, the SSE event, and the embedded page payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    #[serde(flatten)]
    pub bundles: BTreeMap<StatName, StatBundle>,
    pub generated_at: DateTime<Utc>,
    pub is_cached: bool,
}

impl DashboardSnapshot {
    pub fn get(&self, name: StatName) -> Option<&StatBundle> {
        self.bundles.get(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn stat_name_round_trips_through_str() {
        for stat in StatName::ALL {
            assert_eq!(stat.as_str().parse::<StatName>().unwrap(), stat);
        }
        assert!("revenue".parse::<StatName>().is_err());
    }

    #[test]
    fn bundle_serializes_chart_shape() {
        let bundle = StatBundle::measured(
            StatName::Administrations,
            labels(&["Direction Commerciale"]),
            vec![3],
        )
        .with_details(vec![DetailRecord::Administration {
            administration: "Direction Commerciale".to_string(),
            delivered_orders: 3,
        }]);
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["labels"][0], "Direction Commerciale");
        assert_eq!(json["series"][0]["name"], "delivered_orders");
        assert_eq!(json["series"][0]["data"][0], 3);
        assert_eq!(json["all_data"][0]["administration"], "Direction Commerciale");
        assert_eq!(json["all_data"][0]["delivered_orders"], 3);
        assert_eq!(json["data_type"], "administration");
        assert_eq!(json["is_real_data"], true);
        assert_eq!(json["source"], "database");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn user_detail_uses_user_key() {
        let record = DetailRecord::User {
            user: "Awa".to_string(),
            delivered_orders: 2,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["user"], "Awa");
        assert!(json.get("administration").is_none());
    }

    #[test]
    fn error_fallback_is_zero_valued_and_tagged() {
        let bundle = StatBundle::error_fallback(
            StatName::OrderStatus,
            labels(&["pending", "approved"]),
            "connection refused",
        );
        assert_eq!(bundle.values(), &[0, 0]);
        assert!(!bundle.is_real_data);
        assert_eq!(bundle.source, BundleSource::ErrorFallback);
        assert_eq!(bundle.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = StatBundle::measured(StatName::TopProducts, labels(&["A", "B"]), vec![5, 1]);
        let b = StatBundle::measured(StatName::TopProducts, labels(&["A", "B"]), vec![5, 1]);
        let c = StatBundle::measured(StatName::TopProducts, labels(&["A", "B"]), vec![5, 2]);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn fingerprint_covers_details() {
        let product = |quantity| DetailRecord::Product {
            product: "Z".to_string(),
            quantity,
        };
        let base = StatBundle::measured(StatName::TopProducts, labels(&["A"]), vec![5]);
        let one = base.clone().with_details(vec![product(1)]);
        let nine = base.clone().with_details(vec![product(9)]);
        assert_ne!(base.fingerprint, one.fingerprint);
        assert_ne!(one.fingerprint, nine.fingerprint);
        assert_eq!(one.fingerprint, one.compute_fingerprint());
    }

    #[test]
    fn snapshot_is_keyed_by_statistic_name() {
        let mut bundles = BTreeMap::new();
        bundles.insert(
            StatName::Summary,
            StatBundle::measured(StatName::Summary, labels(&["total"]), vec![4]),
        );
        let snapshot = DashboardSnapshot {
            bundles,
            generated_at: Utc::now(),
            is_cached: false,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["summary"]["series"][0]["data"][0], 4);
        assert_eq!(json["is_cached"], false);
        assert!(json["generated_at"].is_string());

        let parsed: DashboardSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn value_of_looks_up_by_label() {
        let bundle = StatBundle::measured(
            StatName::DeliverySplit,
            labels(&["delivered", "not_delivered"]),
            vec![1, 4],
        );
        assert_eq!(bundle.value_of("not_delivered"), Some(4));
        assert_eq!(bundle.value_of("missing"), None);
    }
}
