//! Pure configuration and decision logic for setting up MacPorts on CI
//! runners: input parsing, the macOS release table, package URLs, cache
//! keys, source decisions, release selection, and port arguments.
//!
//! Nothing in this crate touches the network, the filesystem, or child
//! processes; the `setup-macports` crate supplies those.

pub mod cache_key;
pub mod error;
pub mod inputs;
pub mod package_url;
pub mod platform;
pub mod ports;
pub mod release;
pub mod settings;
pub mod sources;

pub use cache_key::{CacheContext, CacheKeyResult, CacheKeyScheme, CacheKeys};
pub use error::ConfigError;
pub use inputs::{InputLookup, parse_settings};
pub use package_url::build_package_url;
pub use platform::{Architecture, PlatformInfo};
pub use release::{Release, VersionResolution};
pub use settings::{PortSpec, Settings, SignatureCheck, SourcesProvider, VariantSelection};
