// Kagami origin-mirroring cache library

pub mod config;
pub mod error;
pub mod freshness;
pub mod http_time;
pub mod logging;
pub mod origin;
pub mod pipeline;
pub mod populate;
pub mod proxy;
pub mod serve;
pub mod store;
