//! sales-ledger: appends bookings to monthly sales workbooks.
//!
//! Each booking lands in `<year>年 <MM>月売上.xlsx` (created from the template
//! on the first booking of a month), at the row that keeps the ledger sorted
//! by date, formatted like the template's header row.

pub mod booking;
pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod updater;

pub use booking::Booking;
pub use config::{LedgerColumns, LedgerConfig, LedgerPaths, SheetLayout};
pub use error::LedgerError;
pub use report::{UpdateReport, run};
pub use updater::{Insertion, LedgerUpdater, UpdateOutcome, insertion_point};
