#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod aggregator;
pub mod load_test;
pub mod measurement;
pub mod scenario;
pub mod setup;
pub mod thresholds;
pub mod transport;

pub(crate) mod scheduler;
pub(crate) mod transaction;
pub(crate) mod vu;

pub use aggregator::{MetricSummary, MetricsAggregator, Summary};
pub use load_test::{LoadTest, RunReport};
pub use prload_core::*;
pub use thresholds::ThresholdOutcome;
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use transport::HttpTransport;
pub use transport::{Request, Response, Transport, TransportError};

pub mod prelude {
    pub use crate::load_test::{LoadTest, RunReport};
    #[cfg(feature = "http")]
    pub use crate::transport::HttpTransport;
    pub use crate::transport::{Request, Response, Transport, TransportError};
    pub use prload_core::{ConfigError, RunConfig, Stage};
}
