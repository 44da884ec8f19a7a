pub mod columns;
pub mod market;
pub mod normalizer;
