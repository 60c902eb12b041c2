pub mod metering_queries;
