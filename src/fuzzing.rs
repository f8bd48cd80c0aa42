#![cfg(all(test, feature = "keccak", feature = "chacha20"))]

use proptest::collection::vec;
use proptest::prelude::*;

use crate::{ChaCha20, Keccak1600Sponge, SecurityLevel, KEY_LEN};

/// An input operation for the duplex sponge.
#[derive(Clone, Debug, PartialEq)]
enum SpongeOp {
    Absorb(Vec<u8>),
    Squeeze(usize),
    Reabsorb,
    Ratchet,
}

/// A transcript of sponge operations, plus the capacity the sponge is created with.
#[derive(Clone, Debug, PartialEq)]
struct SpongeTranscript {
    capacity: usize,
    ops: Vec<SpongeOp>,
}

/// Apply the transcript's operations to a sponge and return everything it squeezed.
fn apply_sponge_transcript(transcript: &SpongeTranscript) -> Vec<Vec<u8>> {
    let mut sponge = Keccak1600Sponge::new(transcript.capacity).unwrap();
    transcript
        .ops
        .iter()
        .flat_map(|op| match op {
            SpongeOp::Absorb(data) => {
                sponge.absorb(data);
                None
            }
            SpongeOp::Squeeze(n) => Some(sponge.squeeze(*n)),
            SpongeOp::Reabsorb => {
                sponge.reabsorb();
                None
            }
            SpongeOp::Ratchet => {
                sponge.ratchet();
                None
            }
        })
        .collect()
}

/// Rewrite the transcript so that every absorb which follows a squeeze is preceded by an explicit
/// reabsorb.
fn with_explicit_reabsorbs(transcript: &SpongeTranscript) -> SpongeTranscript {
    let mut squeezing = false;
    let mut ops = Vec::with_capacity(transcript.ops.len() * 2);
    for op in &transcript.ops {
        match op {
            SpongeOp::Absorb(data) if !data.is_empty() => {
                if squeezing {
                    ops.push(SpongeOp::Reabsorb);
                }
                squeezing = false;
            }
            SpongeOp::Squeeze(n) if *n > 0 => squeezing = true,
            SpongeOp::Reabsorb | SpongeOp::Ratchet => squeezing = false,
            _ => {}
        }
        ops.push(op.clone());
    }
    SpongeTranscript { capacity: transcript.capacity, ops }
}

/// An arbitrary byte string with length 0..400.
fn arb_data() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..400)
}

/// An arbitrary named or custom (byte-aligned) capacity.
fn arb_capacity() -> impl Strategy<Value = usize> {
    prop_oneof![
        Just(SecurityLevel::Security224.bits()),
        Just(SecurityLevel::Security256.bits()),
        Just(SecurityLevel::Security384.bits()),
        Just(SecurityLevel::Security512.bits()),
        (0usize..200).prop_map(|bytes| bytes * 8),
    ]
}

/// An arbitrary sponge operation.
fn arb_sponge_op() -> impl Strategy<Value = SpongeOp> {
    prop_oneof![
        arb_data().prop_map(SpongeOp::Absorb),
        (0usize..400).prop_map(SpongeOp::Squeeze),
        Just(SpongeOp::Reabsorb),
        Just(SpongeOp::Ratchet),
    ]
}

prop_compose! {
    /// A transcript of 0..32 arbitrary sponge operations terminated with a `Squeeze(32)` operation
    /// to capture the sponge's final state.
    fn arb_sponge_transcript()(
        capacity in arb_capacity(),
        mut ops in vec(arb_sponge_op(), 0..32),
    ) -> SpongeTranscript {
        ops.push(SpongeOp::Squeeze(32));
        SpongeTranscript { capacity, ops }
    }
}

/// Split `data` at the given (unsorted, possibly out of range) points.
fn split_at_points(data: &[u8], points: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = points.iter().map(|p| p % (data.len() + 1)).collect();
    points.sort_unstable();
    points.push(data.len());

    let mut start = 0;
    points
        .into_iter()
        .map(|end| {
            let chunk = data[start..end].to_vec();
            start = end;
            chunk
        })
        .collect()
}

proptest! {
    /// Any two equal sponge transcripts must produce equal outputs.
    #[test]
    fn sponge_transcript_consistency(t in arb_sponge_transcript()) {
        prop_assert_eq!(apply_sponge_transcript(&t), apply_sponge_transcript(&t.clone()));
    }

    /// Absorbing after squeezing must behave exactly like an explicit reabsorb first.
    #[test]
    fn implicit_reabsorb(t in arb_sponge_transcript()) {
        prop_assert_eq!(
            apply_sponge_transcript(&t),
            apply_sponge_transcript(&with_explicit_reabsorbs(&t)),
        );
    }

    /// Splitting an absorb or a squeeze into pieces must not change the output.
    #[test]
    fn sponge_split_invariance(
        capacity in arb_capacity(),
        data in vec(any::<u8>(), 0..1000),
        absorb_points in vec(any::<usize>(), 0..8),
        squeeze_points in vec(any::<usize>(), 0..8),
        n in 0usize..1000,
    ) {
        let mut whole = Keccak1600Sponge::new(capacity).unwrap();
        whole.absorb(&data);
        let expected = whole.squeeze(n);

        let mut split = Keccak1600Sponge::new(capacity).unwrap();
        for chunk in split_at_points(&data, &absorb_points) {
            split.absorb(&chunk);
        }
        let mut actual = vec![0u8; n];
        let mut pos = 0;
        for chunk in split_at_points(&expected, &squeeze_points) {
            split.squeeze_mut(&mut actual[pos..pos + chunk.len()]);
            pos += chunk.len();
        }

        prop_assert_eq!(expected, actual);
    }

    /// The offset/length surface must agree with the slice surface.
    #[test]
    fn checked_surface_agrees(
        data in vec(any::<u8>(), 1..300),
        offset in 0usize..300,
        n in 0usize..300,
    ) {
        let offset = offset % data.len();
        let length = n.min(data.len() - offset);

        let mut a = Keccak1600Sponge::with_security(SecurityLevel::Security256).unwrap();
        a.absorb_at(Some(&data[..]), offset as isize, length as isize).unwrap();
        let mut out = vec![0u8; length + 3];
        a.squeeze_at(Some(&mut out[..]), 3, length as isize).unwrap();

        let mut b = Keccak1600Sponge::with_security(SecurityLevel::Security256).unwrap();
        b.absorb(&data[offset..offset + length]);
        prop_assert_eq!(b.squeeze(length), out[3..].to_vec());
    }

    /// Keystream drawn in any number of pieces must equal keystream drawn all at once.
    #[test]
    fn keystream_additivity(
        key in vec(any::<u8>(), KEY_LEN),
        n1 in 0usize..500,
        n2 in 0usize..500,
    ) {
        let mut whole = ChaCha20::new().unwrap();
        whole.initialize(&key).unwrap();
        let expected = whole.keystream(n1 + n2).unwrap();

        let mut split = ChaCha20::new().unwrap();
        split.initialize(&key).unwrap();
        let mut actual = split.keystream(n1).unwrap();
        actual.extend(split.keystream(n2).unwrap());

        prop_assert_eq!(expected, actual);
    }

    /// Decrypting with a freshly keyed session must invert encryption, however the plaintext is
    /// split across calls.
    #[test]
    fn encrypt_decrypt_inverse(
        key in vec(any::<u8>(), KEY_LEN),
        plaintext in arb_data(),
        points in vec(any::<usize>(), 0..6),
    ) {
        let mut outbound = ChaCha20::new().unwrap();
        outbound.initialize(&key).unwrap();
        let mut ciphertext = Vec::with_capacity(plaintext.len());
        for chunk in split_at_points(&plaintext, &points) {
            ciphertext.extend(outbound.encrypt(&chunk).unwrap());
        }

        let mut inbound = ChaCha20::new().unwrap();
        inbound.initialize(&key).unwrap();
        prop_assert_eq!(plaintext, inbound.decrypt(&ciphertext).unwrap());
    }
}
