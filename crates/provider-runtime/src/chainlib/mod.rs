//! # Chain Library
//!
//! Default chain adapter: a spec-driven parser, an HTTP proxy to the chain
//! node and a fetcher that reads the chain head through the proxy.

pub mod fetcher;
pub mod parser;
pub mod proxy;

pub use fetcher::ProxyChainFetcher;
pub use parser::SpecChainParser;
pub use proxy::HttpChainProxy;
