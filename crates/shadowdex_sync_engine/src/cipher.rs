//! Session encryption for network transports.
//!
//! Both peers derive the same pair of AES-256-GCM keys from the rendezvous
//! id, which only they know. Each direction has its own key and a counter
//! nonce, so frames cannot be replayed, reordered or reflected.

use crate::error::{SyncError, SyncResult};
use crate::state::SyncRole;
use aes_gcm::{
    aead::{Aead, KeyInit, generic_array::GenericArray},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use shadowdex_sync_protocol::RendezvousId;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const SALT: &[u8] = b"shadowdex-sync-v1";
const HOST_TO_GUEST: &[u8] = b"host->guest";
const GUEST_TO_HOST: &[u8] = b"guest->host";

#[derive(Zeroize, ZeroizeOnDrop)]
struct DirectionKey {
    bytes: [u8; KEY_SIZE],
}

impl DirectionKey {
    fn derive(id: &RendezvousId, info: &[u8]) -> SyncResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(SALT), id.as_str().as_bytes());
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(info, &mut bytes)
            .map_err(|_| SyncError::transport("session key derivation failed"))?;
        Ok(Self { bytes })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(GenericArray::from_slice(&self.bytes))
    }
}

/// Derives the sealer and opener for one side of a session.
pub fn session_ciphers(id: &RendezvousId, role: SyncRole) -> SyncResult<(FrameSealer, FrameOpener)> {
    let (send_info, recv_info) = match role {
        SyncRole::Host => (HOST_TO_GUEST, GUEST_TO_HOST),
        SyncRole::Guest => (GUEST_TO_HOST, HOST_TO_GUEST),
    };
    let send = DirectionKey::derive(id, send_info)?;
    let recv = DirectionKey::derive(id, recv_info)?;
    Ok((
        FrameSealer {
            cipher: send.cipher(),
            counter: 0,
        },
        FrameOpener {
            cipher: recv.cipher(),
            counter: 0,
        },
    ))
}

fn nonce_bytes(counter: u64) -> [u8; NONCE_SIZE] {
    let mut bytes = [0u8; NONCE_SIZE];
    bytes[4..].copy_from_slice(&counter.to_be_bytes());
    bytes
}

/// Encrypts outbound frames.
pub struct FrameSealer {
    cipher: Aes256Gcm,
    counter: u64,
}

impl FrameSealer {
    /// Encrypts the next frame.
    pub fn seal(&mut self, plaintext: &[u8]) -> SyncResult<Vec<u8>> {
        let nonce = nonce_bytes(self.counter);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SyncError::transport("frame encryption failed"))?;
        self.counter += 1;
        Ok(sealed)
    }
}

/// Decrypts inbound frames, in order.
pub struct FrameOpener {
    cipher: Aes256Gcm,
    counter: u64,
}

impl FrameOpener {
    /// Decrypts the next frame. Fails on a wrong key, a tampered frame, or
    /// a frame out of sequence.
    pub fn open(&mut self, sealed: &[u8]) -> SyncResult<Vec<u8>> {
        if sealed.len() < TAG_SIZE {
            return Err(SyncError::transport("frame too short"));
        }
        let nonce = nonce_bytes(self.counter);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), sealed)
            .map_err(|_| SyncError::transport("frame failed authentication"))?;
        self.counter += 1;
        Ok(plaintext)
    }
}

impl std::fmt::Debug for FrameSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSealer")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for FrameOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameOpener")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RendezvousId {
        RendezvousId::parse(s).unwrap()
    }

    #[test]
    fn host_and_guest_agree() {
        let id = id("shadow-dex-ab12cd34");
        let (mut host_seal, mut host_open) = session_ciphers(&id, SyncRole::Host).unwrap();
        let (mut guest_seal, mut guest_open) = session_ciphers(&id, SyncRole::Guest).unwrap();

        for i in 0..3u8 {
            let sealed = host_seal.seal(&[i; 10]).unwrap();
            assert_eq!(sealed.len(), 10 + TAG_SIZE);
            assert_eq!(guest_open.open(&sealed).unwrap(), vec![i; 10]);
        }
        let sealed = guest_seal.seal(b"back").unwrap();
        assert_eq!(host_open.open(&sealed).unwrap(), b"back");
    }

    #[test]
    fn different_ids_do_not_interoperate() {
        let (mut seal, _) = session_ciphers(&id("shadow-dex-aaaaaaaa"), SyncRole::Host).unwrap();
        let (_, mut open) = session_ciphers(&id("shadow-dex-bbbbbbbb"), SyncRole::Guest).unwrap();
        let sealed = seal.seal(b"hello").unwrap();
        assert!(matches!(open.open(&sealed), Err(SyncError::Transport(_))));
    }

    #[test]
    fn reflected_frames_are_rejected() {
        let id = id("shadow-dex-ab12cd34");
        let (mut seal, mut open) = session_ciphers(&id, SyncRole::Host).unwrap();
        let sealed = seal.seal(b"hello").unwrap();
        assert!(open.open(&sealed).is_err());
    }

    #[test]
    fn replayed_frames_are_rejected() {
        let id = id("shadow-dex-ab12cd34");
        let (mut seal, _) = session_ciphers(&id, SyncRole::Host).unwrap();
        let (_, mut open) = session_ciphers(&id, SyncRole::Guest).unwrap();
        let sealed = seal.seal(b"once").unwrap();
        assert!(open.open(&sealed).is_ok());
        assert!(open.open(&sealed).is_err());
    }

    #[test]
    fn tampered_frames_are_rejected() {
        let id = id("shadow-dex-ab12cd34");
        let (mut seal, _) = session_ciphers(&id, SyncRole::Host).unwrap();
        let (_, mut open) = session_ciphers(&id, SyncRole::Guest).unwrap();
        let mut sealed = seal.seal(b"hello").unwrap();
        sealed[0] ^= 1;
        assert!(open.open(&sealed).is_err());
        assert!(open.open(&[0u8; 3]).is_err());
    }
}
