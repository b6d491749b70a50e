pub mod client;

pub use client::MarketplaceMeteringClient;
