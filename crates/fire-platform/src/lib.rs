//! Fire Platform Layer
//!
//! Host implementations of the collaborators `fire-core` consumes:
//!
//! - **Persistence**: [`FileStore`], JSON snapshots under a data directory
//! - **Network fetch**: [`HttpFetcher`], blocking HTTP(S) downloads
//! - **Identity**: [`PasswdResolver`], [`StaticResolver`], [`ChainResolver`]
//! - **Tunnel**: [`UdpTunnel`], raw datagrams exchanged with a local peer

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub use error::{PlatformError, Result};

mod fetch;
pub use fetch::HttpFetcher;

pub mod identity;
pub use identity::{ChainResolver, PasswdResolver, StaticResolver};

mod store;
pub use store::FileStore;

pub mod tunnel;
pub use tunnel::UdpTunnel;
