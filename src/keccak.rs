use byteorder::{ByteOrder, LittleEndian};
use zeroize::Zeroize;

use crate::sponge::STATE_BYTES;
use crate::{Permutation, Sponge, SpongeGenerator};

/// A duplex sponge over Keccak-f\[1600\].
pub type Keccak1600Sponge = Sponge<KeccakF1600>;

/// A reseeding sponge generator over Keccak-f\[1600\].
pub type KeccakGenerator<S> = SpongeGenerator<KeccakF1600, S>;

/// The Keccak-f\[1600\] permutation from the SHA-3 hash algorithm.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeccakF1600;

impl Permutation<STATE_BYTES> for KeccakF1600 {
    #[inline(always)]
    fn permute(&mut self, state: &mut [u8; STATE_BYTES]) {
        let mut lanes = [0u64; 25];
        LittleEndian::read_u64_into(state, &mut lanes);
        keccak::f1600(&mut lanes);
        LittleEndian::write_u64_into(&lanes, state);
        lanes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use sha3::{Digest, Keccak224, Keccak256, Keccak384, Keccak512};
    use tiny_keccak::{Hasher, Keccak};

    use super::*;
    use crate::SecurityLevel;

    #[test]
    fn zero_state() {
        let mut state = [0u8; STATE_BYTES];
        KeccakF1600.permute(&mut state);

        assert_eq!(
            hex::decode("e7dde140798f25f18a47c033f9ccd584eea95aa61e2698d54d49806f304715bd")
                .expect("invalid hex"),
            &state[..32]
        );
    }

    #[test]
    fn empty_keccak256() {
        let mut sponge = Keccak1600Sponge::with_security(SecurityLevel::Security256).unwrap();

        assert_eq!(
            hex::decode("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
                .expect("invalid hex"),
            sponge.squeeze(32),
        );
    }

    #[test]
    fn one_rate_block_of_zeros() {
        let mut sponge = Keccak1600Sponge::new(512).unwrap();
        assert_eq!(1088, sponge.rate());

        sponge.absorb(&[0u8; 136]);

        assert_eq!(Keccak256::digest([0u8; 136]).to_vec(), sponge.squeeze(32));
    }

    #[test]
    fn matches_keccak_digests() {
        let message = b"The quick brown fox jumps over the lazy dog, again and again and again, \
            until the message spans more than one rate block of every security level.";

        let mut sponge = Keccak1600Sponge::with_security(SecurityLevel::Security224).unwrap();
        sponge.absorb(message);
        assert_eq!(Keccak224::digest(message).to_vec(), sponge.squeeze(28));

        sponge.reinitialize(SecurityLevel::Security256.bits()).unwrap();
        sponge.absorb(message);
        assert_eq!(Keccak256::digest(message).to_vec(), sponge.squeeze(32));

        sponge.reinitialize(SecurityLevel::Security384.bits()).unwrap();
        sponge.absorb(message);
        assert_eq!(Keccak384::digest(message).to_vec(), sponge.squeeze(48));

        sponge.reinitialize(SecurityLevel::Security512.bits()).unwrap();
        sponge.absorb(message);
        assert_eq!(Keccak512::digest(message).to_vec(), sponge.squeeze(64));
    }

    #[test]
    fn long_squeeze() {
        let message = [0xa3u8; 200];
        let mut expected = [0u8; 500];
        let mut keccak = Keccak::v256();
        keccak.update(&message);
        keccak.finalize(&mut expected);

        let mut sponge = Keccak1600Sponge::new(512).unwrap();
        for chunk in message.chunks(7) {
            sponge.absorb(chunk);
        }
        let mut out = [0u8; 500];
        for chunk in out.chunks_mut(33) {
            sponge.squeeze_mut(chunk);
        }

        assert_eq!(expected, out);
    }
}
