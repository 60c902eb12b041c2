pub mod ratios;
pub mod wide_format;

pub use ratios::{compute_ratios, RatioReport};
pub use wide_format::{project, Cell, WideFormatTable, WideRow};
