//! idxkeeper - index and snapshot lifecycle automation for search clusters.

pub mod alert;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod date_cutoff;
pub mod es_http;
pub mod grouping;
pub mod pause;
pub mod prune;
pub mod retention;
pub mod retention_logic;
pub mod runner;
pub mod snapshot_check;
pub mod snapshot_lifecycle;
pub mod snapshot_run;
pub mod tiering;
pub mod types;
