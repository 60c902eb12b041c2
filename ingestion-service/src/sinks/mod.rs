pub mod postgres;

pub use postgres::PgPeriodStore;
