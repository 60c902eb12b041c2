pub mod metering;
pub mod obis;
pub mod period;

pub use metering::{summarize, EntityType, MeteringRecord, MonthlySummary};
pub use obis::{classify, ObisCatalog, ObisCategory, ObisCodeDefinition};
pub use period::Period;
