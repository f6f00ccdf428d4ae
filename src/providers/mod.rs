pub mod entsoe;
pub mod rate_limit;
pub mod riksbank;
pub mod util;

pub use entsoe::EntsoeProvider;
pub use rate_limit::RateLimiter;
pub use riksbank::RiksbankProvider;
