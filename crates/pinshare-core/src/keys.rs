use sha2::Sha256;
use zeroize::Zeroize;

pub const KEY_LEN: usize = 32;

/// Salt mixed into every PIN. Fixed so both peers derive the same key.
pub const PIN_SALT: &[u8] = b"p2p-pin-salt";

pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Symmetric key both peers derive from the PIN they were given out-of-band.
///
/// Never sent over the wire and never persisted; zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret {
    bytes: [u8; KEY_LEN],
}

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2-HMAC-SHA256 over the PIN with the fixed salt and round count.
pub fn derive_key(pin: &str) -> SharedSecret {
    derive_key_with(pin.as_bytes(), PIN_SALT, PBKDF2_ROUNDS)
}

fn derive_key_with(password: &[u8], salt: &[u8], rounds: u32) -> SharedSecret {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut out);
    SharedSecret { bytes: out }
}

/// Derive on the blocking pool; the round count makes this a few hundred ms
/// in debug builds.
pub(crate) async fn derive_key_blocking(pin: &str) -> crate::Result<SharedSecret> {
    let pin = pin.to_owned();
    tokio::task::spawn_blocking(move || derive_key(&pin))
        .await
        .map_err(|e| crate::TransferError::Io(std::io::Error::other(e)))
}
