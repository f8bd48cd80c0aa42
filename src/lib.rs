//! Stateful sessions around two low-level primitives: a Keccak-f\[1600\] duplex sponge and the
//! ChaCha20 stream cipher.
//!
//! The permutation and the cipher core sit behind the [`Permutation`] and [`StreamCore`] traits;
//! this crate owns everything around them: rate/capacity bookkeeping, the absorb/squeeze phase
//! machine, the keystream cursor, bounds checks, and wiping state on drop.
//!
//! ```
//! # #[cfg(all(feature = "keccak", feature = "chacha20"))] {
//! use sponge_prng::{ChaCha20, Keccak1600Sponge, SecurityLevel};
//!
//! let mut sponge = Keccak1600Sponge::with_security(SecurityLevel::Security256)?;
//! sponge.absorb(b"a shared secret");
//! let key = sponge.squeeze(32);
//!
//! let mut stream = ChaCha20::new()?;
//! stream.initialize(&key)?;
//! let ciphertext = stream.encrypt(b"attack at dawn")?;
//!
//! stream.initialize(&key)?;
//! assert_eq!(b"attack at dawn".to_vec(), stream.decrypt(&ciphertext)?);
//! # }
//! # Ok::<(), sponge_prng::Error>(())
//! ```

pub use crate::accumulator::{
    EntropyExtractor, SpongeAccumulator, SpongeExtractor, SpongePrng, DEFAULT_POOLS,
    MAX_ACCUMULATOR_READ,
};
pub use crate::error::{Error, Result};
pub use crate::generator::{
    SeedSource, SpongeGenerator, StreamGenerator, MIN_GENERATOR_CAPACITY, MIN_RESEED_INTERVAL,
};
pub use crate::init::static_init;
pub use crate::sponge::{SecurityLevel, Sponge, STATE_BYTES, WIDTH_BITS};
pub use crate::stream::{StreamCore, StreamSession, KEY_LEN, NONCE_LEN};

#[cfg(feature = "chacha20")]
pub use crate::generator::ChaCha20Generator;
#[cfg(feature = "chacha20")]
pub use crate::stream::{ChaCha20, ChaCha20Core};

#[cfg(feature = "keccak")]
pub use crate::accumulator::KeccakExtractor;
#[cfg(feature = "keccak")]
pub use crate::keccak::{Keccak1600Sponge, KeccakF1600, KeccakGenerator};

#[cfg(all(feature = "keccak", feature = "chacha20"))]
pub use crate::accumulator::{KeccakAccumulator, KeccakPrng};

mod accumulator;
mod bounds;
mod error;
mod fuzzing;
mod generator;
mod init;
#[cfg(feature = "keccak")]
mod keccak;
mod sponge;
mod stream;

/// A cryptographic permutation over a `WIDTH`-byte state.
///
/// The state itself is owned by the session driving the permutation, which hands it in on every
/// call. Implementations may keep bookkeeping of their own but must treat the state as the only
/// input.
pub trait Permutation<const WIDTH: usize>: Default {
    /// Permutes the given state in place.
    fn permute(&mut self, state: &mut [u8; WIDTH]);
}
