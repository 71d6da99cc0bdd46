//! `ledgermatch-recon`: ERP ledger vs bank statement reconciliation engine.
//!
//! Pure engine crate: receives raw tables, returns a deterministic report.
//! No file or network IO.

pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod report;
pub mod similarity;

pub use config::ReconConfig;
pub use engine::reconcile;
pub use error::ReconError;
pub use model::{
    MatchResult, MatchTier, MatchedPair, RawTable, ReconciliationReport, Record, RejectedRow,
    ReportLine, Source,
};
pub use report::Block;
