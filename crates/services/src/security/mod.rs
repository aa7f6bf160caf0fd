pub mod connection_limiter;
pub mod rate_limit;

pub use connection_limiter::ConnectionLimiter;
pub use rate_limit::OperationRateLimiter;
