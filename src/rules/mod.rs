//! Whitelist rules: parsing, first-match resolution and hot reload.
//!
//! The whitelist is an ordered list of glob patterns over canonical
//! request keys (`conn://host:port` for tunnels, `http://host:port` for
//! forwarded requests). Each pattern either allows the request unchanged
//! or rewrites it to a fixed target.
//!
//! # Example
//!
//! ```
//! use chainmux::rules::RuleStore;
//!
//! let store = RuleStore::new();
//! store.load("conn://chain-x:30303\tlocalhost:30308\nhttp://*.pdx.link:80\n");
//!
//! assert_eq!(
//!     store.resolve("conn://chain-x:30303").as_deref(),
//!     Some("localhost:30308")
//! );
//! assert_eq!(
//!     store.resolve("http://a.pdx.link:80").as_deref(),
//!     Some("http://a.pdx.link:80")
//! );
//! assert_eq!(store.resolve("http://other.com:80"), None);
//! ```

mod error;
pub mod resolver;
mod store;
mod table;

pub use error::ConfigError;
pub use resolver::resolve;
pub use store::RuleStore;
pub use table::{RuleEntry, RuleTable};
