use tracing::debug;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::bounds::{checked_pair, checked_range};
use crate::error::{Error, Result};
use crate::init;

/// The size of a stream cipher key, in bytes.
pub const KEY_LEN: usize = 256 / 8;

/// The size of a stream cipher nonce, in bytes.
pub const NONCE_LEN: usize = 64 / 8;

/// A keyed stream cipher core.
///
/// Implementations produce one keystream per key and nonce, starting at block zero, and advance
/// it by exactly one position per byte processed. A core holds expanded key material, so it must
/// wipe itself when dropped; sessions rely on that when they are rekeyed or dropped.
pub trait StreamCore: ZeroizeOnDrop + Sized {
    /// Expands the key and nonce into a fresh keystream positioned at its start.
    fn key_setup(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self;

    /// XORs the next `buf.len()` keystream bytes into `buf`.
    ///
    /// Must fail without modifying `buf` or advancing the keystream if fewer than `buf.len()`
    /// bytes of keystream remain.
    fn apply_keystream(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Writes the next `out.len()` keystream bytes to `out`.
    ///
    /// The default goes through a zeroizing scratch buffer so that `out` is untouched on failure.
    /// Cores which can tell how much keystream remains should override it.
    fn keystream_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let mut ks = Zeroizing::new(vec![0u8; out.len()]);
        self.apply_keystream(&mut ks)?;
        out.copy_from_slice(&ks);
        Ok(())
    }

    /// Encrypts `input` into `output`, which must be the same length.
    fn encrypt_bytes(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let mut buf = Zeroizing::new(input.to_vec());
        self.apply_keystream(&mut buf)?;
        output.copy_from_slice(&buf);
        Ok(())
    }

    /// Decrypts `input` into `output`, which must be the same length.
    fn decrypt_bytes(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        self.encrypt_bytes(input, output)
    }
}

/// A ChaCha20 stream session.
#[cfg(feature = "chacha20")]
pub type ChaCha20 = StreamSession<ChaCha20Core>;

/// The djb variant of ChaCha20 with a 64-bit nonce.
///
/// The expanded key schedule is wiped when the core is dropped.
#[cfg(feature = "chacha20")]
pub struct ChaCha20Core(chacha20::ChaCha20Legacy);

/// The number of keystream bytes a djb ChaCha20 key and nonce yield with a 32-bit block counter.
#[cfg(feature = "chacha20")]
const CHACHA20_KEYSTREAM_LEN: u64 = 64 * u32::MAX as u64;

#[cfg(feature = "chacha20")]
impl ZeroizeOnDrop for ChaCha20Core {}

#[cfg(feature = "chacha20")]
impl StreamCore for ChaCha20Core {
    fn key_setup(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        use chacha20::cipher::KeyIvInit;

        ChaCha20Core(chacha20::ChaCha20Legacy::new(
            chacha20::Key::from_slice(key),
            chacha20::LegacyNonce::from_slice(nonce),
        ))
    }

    fn apply_keystream(&mut self, buf: &mut [u8]) -> Result<()> {
        use chacha20::cipher::StreamCipher;

        self.0.try_apply_keystream(buf).map_err(|_| Error::KeystreamExhausted)
    }

    fn keystream_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        use chacha20::cipher::StreamCipherSeek;

        let pos: u64 = self.0.try_current_pos().map_err(|_| Error::KeystreamExhausted)?;
        match pos.checked_add(out.len() as u64) {
            Some(end) if end <= CHACHA20_KEYSTREAM_LEN => {}
            _ => return Err(Error::KeystreamExhausted),
        }

        out.fill(0);
        self.apply_keystream(out)
    }
}

/// A stream cipher session: a key, a nonce, and a keystream cursor.
///
/// A session starts out unkeyed and must be given a key with [`StreamSession::initialize`] (or
/// [`StreamSession::initialize_with_nonce`]) before it produces any output. Every byte of
/// keystream, encryption, or decryption advances the same cursor, so splitting a call into several
/// shorter calls yields exactly the same bytes. Encryption and decryption are the same XOR with
/// the keystream; to decrypt, key a session identically and replay the same lengths.
pub struct StreamSession<C: StreamCore> {
    core: Option<C>,
}

impl<C: StreamCore> StreamSession<C> {
    /// Creates an unkeyed session.
    pub fn new() -> Result<Self> {
        init::static_init()?;
        Ok(StreamSession { core: None })
    }

    /// Whether the session has been given a key.
    pub fn is_initialized(&self) -> bool {
        self.core.is_some()
    }

    /// Keys the session with a 256-bit key and the all-zero nonce.
    ///
    /// Re-keying replaces (and wipes) any previous keystream and rewinds the cursor.
    pub fn initialize(&mut self, key: &[u8]) -> Result<()> {
        let key: &[u8; KEY_LEN] = key.try_into().map_err(|_| Error::InvalidParameter("key"))?;
        self.initialize_with_nonce(key, &[0u8; NONCE_LEN]);
        Ok(())
    }

    /// Keys the session with a 256-bit key and an explicit 64-bit nonce.
    pub fn initialize_with_nonce(&mut self, key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN]) {
        self.core = Some(C::key_setup(key, nonce));
        debug!("keyed stream session");
    }

    /// Keys the session with the `length` bytes of `key` starting at `offset`.
    ///
    /// `length` must be exactly [`KEY_LEN`].
    pub fn initialize_at(
        &mut self,
        key: Option<&[u8]>,
        offset: isize,
        length: isize,
    ) -> Result<()> {
        let key = key.ok_or(Error::MissingBuffer("key"))?;
        let range = checked_range(key.len(), offset, length)?;
        self.initialize(&key[range])
    }

    /// Fills `out` with the next bytes of keystream.
    pub fn keystream_mut(&mut self, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        self.core_mut()?.keystream_bytes(out)
    }

    /// Returns the next `n` bytes of keystream.
    pub fn keystream(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut b = vec![0u8; n];
        self.keystream_mut(&mut b)?;
        Ok(b)
    }

    /// Writes `length` bytes of keystream into `buffer` starting at `offset`.
    pub fn keystream_at(
        &mut self,
        buffer: Option<&mut [u8]>,
        offset: isize,
        length: isize,
    ) -> Result<()> {
        let buffer = buffer.ok_or(Error::MissingBuffer("buffer"))?;
        let range = checked_range(buffer.len(), offset, length)?;
        self.keystream_mut(&mut buffer[range])
    }

    /// Encrypts the given buffer in place.
    pub fn encrypt_mut(&mut self, in_out: &mut [u8]) -> Result<()> {
        if in_out.is_empty() {
            return Ok(());
        }
        self.core_mut()?.apply_keystream(in_out)
    }

    /// Decrypts the given buffer in place.
    pub fn decrypt_mut(&mut self, in_out: &mut [u8]) -> Result<()> {
        self.encrypt_mut(in_out)
    }

    /// Encrypts `input` into `output`.
    pub fn encrypt_into(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() != output.len() {
            return Err(Error::OutOfRange("length"));
        }
        if input.is_empty() {
            return Ok(());
        }
        self.core_mut()?.encrypt_bytes(input, output)
    }

    /// Decrypts `input` into `output`.
    pub fn decrypt_into(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() != output.len() {
            return Err(Error::OutOfRange("length"));
        }
        if input.is_empty() {
            return Ok(());
        }
        self.core_mut()?.decrypt_bytes(input, output)
    }

    /// Returns the encryption of `bin`.
    pub fn encrypt(&mut self, bin: &[u8]) -> Result<Vec<u8>> {
        let mut c = bin.to_vec();
        self.encrypt_mut(&mut c)?;
        Ok(c)
    }

    /// Returns the decryption of `bin`.
    pub fn decrypt(&mut self, bin: &[u8]) -> Result<Vec<u8>> {
        let mut p = bin.to_vec();
        self.decrypt_mut(&mut p)?;
        Ok(p)
    }

    /// Encrypts `length` bytes of `input` at `input_offset` into `output` at `output_offset`.
    pub fn encrypt_at(
        &mut self,
        input: Option<&[u8]>,
        input_offset: isize,
        output: Option<&mut [u8]>,
        output_offset: isize,
        length: isize,
    ) -> Result<()> {
        let input = input.ok_or(Error::MissingBuffer("input"))?;
        let output = output.ok_or(Error::MissingBuffer("output"))?;
        let (src, dst) =
            checked_pair(input.len(), input_offset, output.len(), output_offset, length)?;
        self.encrypt_into(&input[src], &mut output[dst])
    }

    /// Decrypts `length` bytes of `input` at `input_offset` into `output` at `output_offset`.
    pub fn decrypt_at(
        &mut self,
        input: Option<&[u8]>,
        input_offset: isize,
        output: Option<&mut [u8]>,
        output_offset: isize,
        length: isize,
    ) -> Result<()> {
        let input = input.ok_or(Error::MissingBuffer("input"))?;
        let output = output.ok_or(Error::MissingBuffer("output"))?;
        let (src, dst) =
            checked_pair(input.len(), input_offset, output.len(), output_offset, length)?;
        self.decrypt_into(&input[src], &mut output[dst])
    }

    fn core_mut(&mut self) -> Result<&mut C> {
        self.core.as_mut().ok_or(Error::Uninitialized)
    }
}

impl<C: StreamCore> core::fmt::Debug for StreamSession<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamSession").field("initialized", &self.is_initialized()).finish()
    }
}


#[cfg(all(test, feature = "chacha20"))]
mod chacha20_tests {
    use super::*;

    #[test]
    fn zero_key_vector() {
        let mut session = ChaCha20::new().unwrap();
        session.initialize(&[0u8; KEY_LEN]).unwrap();

        assert_eq!(
            hex::decode("76b8e0ada0f13d90405d6ae55386bd28bdd219b8a08ded1aa836efcc8b770dc7")
                .expect("invalid hex"),
            session.keystream(32).unwrap(),
        );
    }

    #[test]
    fn cursor_crosses_blocks() {
        let key = [0x42u8; KEY_LEN];
        let nonce = [0x24u8; NONCE_LEN];

        let mut whole = ChaCha20::new().unwrap();
        whole.initialize_with_nonce(&key, &nonce);
        let expected = whole.keystream(300).unwrap();

        let mut split = ChaCha20::new().unwrap();
        split.initialize_with_nonce(&key, &nonce);
        let mut actual = Vec::new();
        for n in [1, 63, 64, 65, 7, 100] {
            actual.extend(split.keystream(n).unwrap());
        }

        assert_eq!(expected, actual);
    }

    #[test]
    fn keystream_overwrites_the_buffer() {
        let mut session = ChaCha20::new().unwrap();
        session.initialize(&[0u8; KEY_LEN]).unwrap();

        let mut out = [0xffu8; 32];
        session.keystream_mut(&mut out).unwrap();

        assert_eq!(
            hex::decode("76b8e0ada0f13d90405d6ae55386bd28bdd219b8a08ded1aa836efcc8b770dc7")
                .expect("invalid hex"),
            out
        );
    }

    #[test]
    fn exhausted_keystream_leaves_output_untouched() {
        use chacha20::cipher::StreamCipherSeek;

        let mut core = ChaCha20Core::key_setup(&[1u8; KEY_LEN], &[2u8; NONCE_LEN]);
        core.0.seek(CHACHA20_KEYSTREAM_LEN - 10);

        let mut out = [0xaau8; 20];
        assert_eq!(Err(Error::KeystreamExhausted), core.keystream_bytes(&mut out));
        assert_eq!([0xaau8; 20], out);
    }

    #[test]
    fn cores_wipe_themselves() {
        fn wipes_on_drop<T: ZeroizeOnDrop>() {}

        wipes_on_drop::<chacha20::ChaCha20Legacy>();
        wipes_on_drop::<ChaCha20Core>();
    }

    #[test]
    fn nonce_changes_keystream() {
        let key = [0x42u8; KEY_LEN];
        let mut a = ChaCha20::new().unwrap();
        let mut b = ChaCha20::new().unwrap();
        a.initialize_with_nonce(&key, &[0u8; NONCE_LEN]);
        b.initialize_with_nonce(&key, &[1u8; NONCE_LEN]);

        assert_ne!(a.keystream(64).unwrap(), b.keystream(64).unwrap());
    }

    #[test]
    fn round_trip() {
        let key = [0x11u8; KEY_LEN];
        let message = vec![0x5au8; 1000];

        let mut outbound = ChaCha20::new().unwrap();
        outbound.initialize(&key).unwrap();
        let mut ciphertext = vec![0u8; message.len()];
        outbound.encrypt_into(&message[..400], &mut ciphertext[..400]).unwrap();
        outbound.encrypt_into(&message[400..], &mut ciphertext[400..]).unwrap();

        let mut inbound = ChaCha20::new().unwrap();
        inbound.initialize(&key).unwrap();
        assert_eq!(message, inbound.decrypt(&ciphertext).unwrap());
    }
}
