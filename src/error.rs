use thiserror::Error;

/// The ways a sponge, stream, or generator operation can fail.
///
/// Every variant is reported before the underlying primitive is touched, so a failed call never
/// leaves partial output behind.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A required buffer was not supplied.
    #[error("missing buffer: {0}")]
    MissingBuffer(&'static str),

    /// An offset or length was negative or reached past the end of its buffer.
    #[error("out of range: {0}")]
    OutOfRange(&'static str),

    /// A parameter was rejected by the primitive (e.g. an unsupported capacity or key size).
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The session's state could not be allocated.
    #[error("unable to allocate session state")]
    AllocationFailure,

    /// A keystream operation was attempted before the session was keyed.
    #[error("stream session has not been initialized with a key")]
    Uninitialized,

    /// The keystream for the current key and nonce has been used up.
    #[error("keystream exhausted for this key and nonce")]
    KeystreamExhausted,

    /// A generator's seed source returned too little material to reseed.
    #[error("unable to obtain seed material")]
    SeedUnavailable,

    /// A primitive failed its known-answer test during static initialization.
    #[error("self-test failed: {0}")]
    SelfTestFailure(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
