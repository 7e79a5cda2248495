//! Remote sync client: facade over the external CRUD API.

pub mod client;
pub mod mock;
pub mod traits;

pub use client::HttpRemoteStore;
pub use mock::MockRemoteStore;
pub use traits::RemoteStore;
