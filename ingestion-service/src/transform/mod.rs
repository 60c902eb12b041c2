use leneda_client::domain::{EntityType, MeteringRecord, ObisCodeDefinition, Period};

use crate::pipeline::{Entity, Reading};

/// Reasons a syntactically valid reading is still discarded.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReadingRejected {
    #[error("value is not a finite number")]
    NonFiniteValue,
    #[error("interval ends before it starts")]
    InvertedInterval,
    #[error("interval does not overlap the requested period")]
    OutsidePeriod,
}

/// Pure validation of a `Reading` fetched for `period`.
///
/// Rules:
/// - value must be finite.
/// - ended_at must not precede started_at.
/// - started_at must not fall after the period's last day, and ended_at must
///   not fall before its first day, comparing dates in the reading's offset.
pub fn validate_reading(r: &Reading, period: &Period) -> Result<(), ReadingRejected> {
    if !r.value.is_finite() {
        return Err(ReadingRejected::NonFiniteValue);
    }

    if let (Some(start), Some(end)) = (r.started_at, r.ended_at) {
        if end < start {
            return Err(ReadingRejected::InvertedInterval);
        }
    }

    let starts_after = r.started_at.is_some_and(|ts| ts.date() > period.end_date);
    let ends_before = r.ended_at.is_some_and(|ts| ts.date() < period.start_date);
    if starts_after || ends_before {
        return Err(ReadingRejected::OutsidePeriod);
    }

    Ok(())
}

/// Build the long-form record for one (entity, code) call.
///
/// `None` yields an unavailable record with no value.
pub fn materialize(
    period: &Period,
    entity_type: EntityType,
    entity: &Entity,
    def: &ObisCodeDefinition,
    reading: Option<Reading>,
) -> MeteringRecord {
    let mut record = MeteringRecord {
        year: period.year,
        month: period.month,
        entity_type,
        entity_name: entity.name.clone(),
        meter_id: entity.meter_id.clone(),
        obis_code: def.code.clone(),
        category: def.category,
        description: def.description.clone(),
        value: None,
        unit: String::new(),
        started_at: None,
        ended_at: None,
        calculated: None,
        source_type: None,
        available: false,
    };

    if let Some(r) = reading {
        record.value = Some(r.value);
        record.unit = r.unit;
        record.started_at = r.started_at;
        record.ended_at = r.ended_at;
        record.calculated = r.calculated;
        record.source_type = r.source_type;
        record.available = true;
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use leneda_client::domain::ObisCategory;
    use time::macros::datetime;

    fn reading() -> Reading {
        Reading {
            value: 12.5,
            unit: "kWh".into(),
            started_at: Some(datetime!(2024-03-01 00:00:00 UTC)),
            ended_at: Some(datetime!(2024-03-31 23:45:00 UTC)),
            calculated: Some(false),
            source_type: Some("Actual".into()),
        }
    }

    fn def() -> ObisCodeDefinition {
        ObisCodeDefinition {
            code: "1-1:1.29.0".into(),
            category: ObisCategory::Consumption,
            description: "Measured active consumption".into(),
        }
    }

    fn entity() -> Entity {
        Entity {
            name: "School".into(),
            meter_id: "LU001".into(),
        }
    }

    fn march() -> Period {
        Period::for_month(2024, 3).unwrap()
    }

    #[test]
    fn reading_validation_accepts_valid_reading() {
        assert_eq!(validate_reading(&reading(), &march()), Ok(()));

        let mut no_ts = reading();
        no_ts.started_at = None;
        no_ts.ended_at = None;
        assert_eq!(validate_reading(&no_ts, &march()), Ok(()));
    }

    #[test]
    fn reading_validation_accepts_local_midnight_boundaries() {
        let mut r = reading();
        r.started_at = Some(datetime!(2024-02-29 23:00:00 UTC));
        r.ended_at = Some(datetime!(2024-03-31 22:00:00 UTC));
        assert_eq!(validate_reading(&r, &march()), Ok(()));
    }

    #[test]
    fn reading_validation_accepts_far_future_periods() {
        let period = Period::for_month(2100, 1).unwrap();
        let mut r = reading();
        r.started_at = Some(datetime!(2100-01-01 00:00:00 UTC));
        r.ended_at = Some(datetime!(2100-02-01 00:00:00 UTC));
        assert_eq!(validate_reading(&r, &period), Ok(()));
    }

    #[test]
    fn reading_validation_rejects_nan() {
        let mut r = reading();
        r.value = f64::NAN;
        assert_eq!(validate_reading(&r, &march()), Err(ReadingRejected::NonFiniteValue));
    }

    #[test]
    fn reading_validation_rejects_inverted_and_foreign_intervals() {
        let mut inverted = reading();
        inverted.ended_at = Some(datetime!(2024-02-01 00:00:00 UTC));
        assert_eq!(
            validate_reading(&inverted, &march()),
            Err(ReadingRejected::InvertedInterval)
        );

        let mut later = reading();
        later.started_at = Some(datetime!(2024-04-01 00:00:00 UTC));
        later.ended_at = Some(datetime!(2024-05-01 00:00:00 UTC));
        assert_eq!(validate_reading(&later, &march()), Err(ReadingRejected::OutsidePeriod));

        let mut earlier = reading();
        earlier.started_at = Some(datetime!(1800-01-01 00:00:00 UTC));
        earlier.ended_at = Some(datetime!(1800-02-01 00:00:00 UTC));
        assert_eq!(validate_reading(&earlier, &march()), Err(ReadingRejected::OutsidePeriod));
    }

    #[test]
    fn materialize_copies_reading_and_identity() {
        let period = Period::for_month(2024, 3).unwrap();
        let rec = materialize(&period, EntityType::Consumer, &entity(), &def(), Some(reading()));

        assert!(rec.available);
        assert_eq!((rec.year, rec.month), (2024, 3));
        assert_eq!(rec.value, Some(12.5));
        assert_eq!(rec.unit, "kWh");
        assert_eq!(rec.meter_id, "LU001");
        assert_eq!(rec.category, ObisCategory::Consumption);
        assert_eq!(rec.source_type.as_deref(), Some("Actual"));
    }

    #[test]
    fn materialize_without_reading_is_unavailable() {
        let period = Period::for_month(2024, 3).unwrap();
        let rec = materialize(&period, EntityType::Consumer, &entity(), &def(), None);

        assert!(!rec.available);
        assert_eq!(rec.value, None);
        assert_eq!(rec.available_value(), None);
        assert_eq!(rec.description, "Measured active consumption");
    }
}
