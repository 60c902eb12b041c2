use serde::Serialize;

use crate::domain::{metering::round2, MeteringRecord, ObisCategory};

pub const MEASURED_CONSUMPTION: &str = "1-1:1.29.0";
pub const MEASURED_PRODUCTION: &str = "1-1:2.29.0";
pub const REMAINING_CONSUMPTION: &str = "1-65:1.29.9";
pub const REMAINING_PRODUCTION: &str = "1-65:2.29.9";
pub const SHARED_CONSUMPTION_LAYERS: [&str; 4] =
    ["1-65:1.29.1", "1-65:1.29.2", "1-65:1.29.3", "1-65:1.29.4"];
pub const SHARED_PRODUCTION_LAYERS: [&str; 4] =
    ["1-65:2.29.1", "1-65:2.29.2", "1-65:2.29.3", "1-65:2.29.4"];

/// Energy-flow magnitudes and ratios of one period, kept at full precision.
///
/// Use [`RatioReport::entries`] or serialization for rounded presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatioReport {
    pub year: i32,
    pub month: u8,
    pub total_consumption: f64,
    pub total_production: f64,
    pub measured_consumption: f64,
    pub measured_production: f64,
    pub energy_bought: f64,
    pub energy_sold: f64,
    pub energy_shared_consumption: f64,
    pub energy_shared_production: f64,
    pub production_to_consumption_ratio: f64,
    pub self_consumption_ratio: f64,
    pub self_sufficiency_ratio: f64,
    pub energy_bought_ratio: f64,
    pub energy_sold_ratio: f64,
}

/// `numerator / denominator * 100`, or 0 when the denominator is not positive.
fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

pub fn compute_ratios(year: i32, month: u8, records: &[MeteringRecord]) -> RatioReport {
    let mut r = RatioReport {
        year,
        month,
        ..RatioReport::default()
    };

    for rec in records {
        let Some(value) = rec.available_value() else {
            continue;
        };

        match rec.category {
            ObisCategory::Consumption => r.total_consumption += value,
            ObisCategory::Production => r.total_production += value,
        }

        let code = rec.obis_code.as_str();
        match code {
            MEASURED_CONSUMPTION => r.measured_consumption += value,
            MEASURED_PRODUCTION => r.measured_production += value,
            REMAINING_CONSUMPTION => r.energy_bought += value,
            REMAINING_PRODUCTION => r.energy_sold += value,
            _ if SHARED_CONSUMPTION_LAYERS.contains(&code) => r.energy_shared_consumption += value,
            _ if SHARED_PRODUCTION_LAYERS.contains(&code) => r.energy_shared_production += value,
            _ => {}
        }
    }

    r.production_to_consumption_ratio = percentage(r.total_production, r.total_consumption);
    // Against metered consumption, not the all-codes total.
    r.self_consumption_ratio = percentage(r.energy_shared_consumption, r.measured_consumption);
    r.self_sufficiency_ratio =
        percentage(r.measured_consumption - r.energy_bought, r.measured_consumption);
    r.energy_bought_ratio = percentage(r.energy_bought, r.measured_consumption);
    r.energy_sold_ratio = percentage(r.energy_sold, r.measured_production);

    r
}

impl RatioReport {
    /// Named values rounded to two decimals, in a fixed order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        [
            ("total_consumption", self.total_consumption),
            ("total_production", self.total_production),
            ("measured_consumption", self.measured_consumption),
            ("measured_production", self.measured_production),
            ("energy_bought", self.energy_bought),
            ("energy_shared_consumption", self.energy_shared_consumption),
            ("energy_shared_production", self.energy_shared_production),
            ("energy_sold", self.energy_sold),
            ("production_to_consumption_ratio", self.production_to_consumption_ratio),
            ("self_consumption_ratio", self.self_consumption_ratio),
            ("self_sufficiency_ratio", self.self_sufficiency_ratio),
            ("energy_bought_ratio", self.energy_bought_ratio),
            ("energy_sold_ratio", self.energy_sold_ratio),
        ]
        .into_iter()
        .map(|(k, v)| (k, round2(v)))
        .collect()
    }
}

impl Serialize for RatioReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let entries = self.entries();
        let mut map = serializer.serialize_map(Some(entries.len() + 2))?;
        map.serialize_entry("year", &self.year)?;
        map.serialize_entry("month", &self.month)?;
        for (k, v) in entries {
            map.serialize_entry(k, &v)?;
        }
        map.end()
    }
}
