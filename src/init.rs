//! Process-wide static initialization.
//!
//! Before the first session is constructed, the concrete primitives compiled into the crate are
//! checked against known answers. The check runs once per process no matter how many sessions are
//! created or from how many threads; its result is cached and every later constructor sees the
//! same outcome.
use std::sync::OnceLock;

use tracing::{debug, error};

use crate::error::{Error, Result};

static SELF_TEST: OnceLock<Result<()>> = OnceLock::new();

#[cfg(test)]
pub(crate) static RUNS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// Runs the one-time primitive self-tests, if they have not run yet, and returns their outcome.
///
/// Session constructors call this themselves; calling it directly only moves the cost up front.
pub fn static_init() -> Result<()> {
    *SELF_TEST.get_or_init(|| {
        #[cfg(test)]
        RUNS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let result = self_test();
        match result {
            Ok(()) => debug!("primitive self-tests passed"),
            Err(e) => error!(%e, "primitive self-tests failed"),
        }
        result
    })
}

fn self_test() -> Result<()> {
    #[cfg(feature = "keccak")]
    keccak_self_test()?;
    #[cfg(feature = "chacha20")]
    chacha20_self_test()?;
    Ok(())
}

/// Keccak-f\[1600\] applied once to the all-zero state.
#[cfg(feature = "keccak")]
fn keccak_self_test() -> Result<()> {
    use crate::sponge::STATE_BYTES;
    use crate::{KeccakF1600, Permutation};

    const EXPECTED: [u8; 16] = [
        0xe7, 0xdd, 0xe1, 0x40, 0x79, 0x8f, 0x25, 0xf1, 0x8a, 0x47, 0xc0, 0x33, 0xf9, 0xcc, 0xd5,
        0x84,
    ];

    let mut state = [0u8; STATE_BYTES];
    KeccakF1600.permute(&mut state);
    if state[..EXPECTED.len()] != EXPECTED {
        return Err(Error::SelfTestFailure("keccak-f[1600]"));
    }
    Ok(())
}

/// The first ChaCha20 keystream bytes for the all-zero key and nonce.
#[cfg(feature = "chacha20")]
fn chacha20_self_test() -> Result<()> {
    use crate::stream::{KEY_LEN, NONCE_LEN};
    use crate::{ChaCha20Core, StreamCore};

    const EXPECTED: [u8; 16] = [
        0x76, 0xb8, 0xe0, 0xad, 0xa0, 0xf1, 0x3d, 0x90, 0x40, 0x5d, 0x6a, 0xe5, 0x53, 0x86, 0xbd,
        0x28,
    ];

    let mut core = ChaCha20Core::key_setup(&[0u8; KEY_LEN], &[0u8; NONCE_LEN]);
    let mut ks = [0u8; 16];
    core.keystream_bytes(&mut ks).map_err(|_| Error::SelfTestFailure("chacha20"))?;
    if ks != EXPECTED {
        return Err(Error::SelfTestFailure("chacha20"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::thread;

    use super::*;

    #[test]
    fn runs_once() {
        let handles: Vec<_> = (0..8).map(|_| thread::spawn(static_init)).collect();
        for handle in handles {
            assert_eq!(Ok(()), handle.join().unwrap());
        }
        assert_eq!(Ok(()), static_init());
        assert_eq!(1, RUNS.load(Ordering::SeqCst));
    }
}
