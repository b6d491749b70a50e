pub mod host_ledger;

pub use host_ledger::UniqueHostLedger;
