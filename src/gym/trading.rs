pub mod action;
pub mod config;
pub mod env;
pub mod ledger;
pub mod position;
pub mod reward;
pub mod state;
