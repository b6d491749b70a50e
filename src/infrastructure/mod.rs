pub mod core;
pub mod marketplace;
pub mod mock;
pub mod observability;
pub mod usage;
