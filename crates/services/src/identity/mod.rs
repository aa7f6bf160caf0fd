pub mod http;
pub mod mock;
pub mod ports;

pub use http::HttpIdentityClient;
pub use mock::MockIdentityClient;
pub use ports::IdentityClient;
