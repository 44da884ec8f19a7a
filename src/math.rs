pub mod rolling;
pub mod stats;
