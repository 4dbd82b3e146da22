//! Validation errors raised while turning raw action inputs into settings.
//!
//! Every variant is fatal: a malformed input is reported immediately and is
//! never retried. Messages name the offending value so the workflow author
//! can fix it without reading the source.

use thiserror::Error;

/// Errors produced while parsing or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A boolean-like input held something other than a recognised flag.
    #[error("input `{input}` must be a boolean (true/false, yes/no, on/off, 1/0), got {value:?}")]
    InvalidBoolean {
        /// Name of the input.
        input: String,
        /// The rejected value.
        value: String,
    },

    /// A variant token did not start with `+` or `-`, or had no name.
    #[error("invalid variant {token:?}: variants must be written as +name or -name")]
    InvalidVariant {
        /// The rejected token.
        token: String,
    },

    /// The installation prefix is not an absolute path.
    #[error("prefix must be an absolute path, got {prefix:?}")]
    RelativePrefix {
        /// The rejected prefix.
        prefix: String,
    },

    /// The requested version is empty.
    #[error("version must not be empty")]
    EmptyVersion,

    /// The sources provider is not one of the supported modes.
    #[error("invalid sources provider {value:?}; expected one of auto, git, rsync, custom")]
    InvalidProvider {
        /// The rejected value.
        value: String,
    },

    /// The signature check mode is not recognised.
    #[error("invalid signature check mode {value:?}; expected strict, permissive, or disabled")]
    InvalidSignatureCheck {
        /// The rejected value.
        value: String,
    },

    /// The cache key scheme is not recognised.
    #[error("invalid cache key scheme {value:?}; expected fingerprint, simple, or legacy")]
    InvalidCacheKeyScheme {
        /// The rejected value.
        value: String,
    },

    /// The git repository is neither `owner/repo` nor a clone URL.
    #[error("invalid git repository {value:?}; expected owner/repo, https://..., or git@...")]
    InvalidRepository {
        /// The rejected value.
        value: String,
    },

    /// The ports input looked like JSON but could not be decoded.
    #[error("invalid ports JSON: {reason}")]
    InvalidPortsJson {
        /// Decoder message.
        reason: String,
    },

    /// A port entry had an empty name, or variants appeared before any port.
    #[error("invalid port entry {entry:?}: {reason}")]
    InvalidPort {
        /// The offending entry.
        entry: String,
        /// Why the entry was rejected.
        reason: &'static str,
    },

    /// Custom sources were requested without any source locations.
    #[error("sources provider `custom` requires at least one entry in `sources`")]
    EmptyCustomSources,

    /// More than one custom source was marked as the default.
    #[error("{count} sources are marked [default]; exactly one default source is allowed")]
    ConflictingDefaultSources {
        /// Number of entries carrying the marker.
        count: usize,
    },

    /// The OS version number does not begin with digits.
    #[error("cannot parse macOS version number {value:?}")]
    InvalidPlatformVersion {
        /// The rejected version number.
        value: String,
    },

    /// The OS major version has no known release name.
    #[error("unsupported macOS version {version}; supported major versions: {supported}")]
    UnsupportedPlatform {
        /// The unsupported major version.
        version: String,
        /// Comma-separated list of supported majors.
        supported: String,
    },

    /// The CPU architecture is not one MacPorts ships packages for.
    #[error("unsupported architecture {value:?}; expected arm64 or x86_64")]
    UnsupportedArchitecture {
        /// The rejected architecture string.
        value: String,
    },
}

/// Result type alias using [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
