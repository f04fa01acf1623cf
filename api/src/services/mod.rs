pub mod aggregation;
pub mod dly;
pub mod geo;
pub mod metadata;
pub mod records;
pub mod station_data;
pub mod validation;
