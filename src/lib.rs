//! pqbench - TLS 1.3 hybrid handshake benchmark and CARI scoring
//!
//! Measures real TLS 1.3 handshake latency for classical vs post-quantum
//! hybrid key-exchange groups against a live endpoint, reduces the samples
//! into defensible statistics with a significance verdict, and scores
//! crypto-agility maturity profiles against a weighted rubric.
//!
//! # Architecture
//!
//! ```text
//! +-----------+     +------------+     +-----------+
//! |  config/  +----->  campaign/ +----->  stats/   |
//! +-----------+     +-----+------+     +-----+-----+
//!                         |                  |
//!                   +-----v------+     +-----v-----+
//!                   |  driver/   |     |  report/  |
//!                   | (TLS 1.3)  |     +-----^-----+
//!                   +------------+           |
//!                                      +-----+-----+
//!                                      |   cari/   |
//!                                      +-----------+
//! ```
//!
//! The driver issues one handshake per call with the key-exchange group
//! pinned; the campaign controller runs warm-up and measured trials
//! strictly sequentially; the stats reducer summarizes and compares; the
//! CARI engine scores maturity profiles. `report/` exposes everything as
//! plain structured data for external rendering.

pub mod campaign;
pub mod cari;
pub mod common;
pub mod config;
pub mod driver;
pub mod report;
pub mod stats;

pub use common::error::{Error, Result};
pub use config::Config;

/// Harness version
pub const VERSION: &str = "0.2.1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
