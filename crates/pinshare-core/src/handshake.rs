//! PIN handshake.
//!
//! The responder (listening side) sends a fresh nonce; the initiator answers
//! with `HMAC-SHA256(key, MAGIC ‖ nonce)`; the responder checks it in constant
//! time and replies `"OK"` or `"NO"`.
//!
//! Only the initiator proves knowledge of the key. The initiator learns
//! nothing about the responder's key beyond the status marker.

use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::keys::SharedSecret;
use crate::wire::{self, MAGIC, NONCE_LEN, TOKEN_LEN};
use crate::{Result, TransferError};

type HmacSha256 = Hmac<Sha256>;

/// Which end of the handshake this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting side; the sender.
    Initiator,
    /// Listening side; the receiver.
    Responder,
}

fn keyed_mac(key: &SharedSecret, nonce: &[u8; NONCE_LEN]) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(MAGIC);
    mac.update(nonce);
    mac
}

/// `HMAC-SHA256(key, MAGIC ‖ nonce)`
pub fn auth_token(key: &SharedSecret, nonce: &[u8; NONCE_LEN]) -> [u8; TOKEN_LEN] {
    let mut token = [0u8; TOKEN_LEN];
    token.copy_from_slice(&keyed_mac(key, nonce).finalize().into_bytes());
    token
}

/// Constant-time check of a peer's token.
pub fn verify_token(key: &SharedSecret, nonce: &[u8; NONCE_LEN], token: &[u8; TOKEN_LEN]) -> bool {
    keyed_mac(key, nonce).verify_slice(token).is_ok()
}

pub fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Run the handshake for `role`.
pub async fn perform<T>(role: Role, key: &SharedSecret, transport: &mut T) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    match role {
        Role::Initiator => initiate(key, transport).await,
        Role::Responder => respond(key, transport).await,
    }
}

/// Initiator side: answer the nonce and wait for the verdict.
pub async fn initiate<T>(key: &SharedSecret, transport: &mut T) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let nonce: [u8; NONCE_LEN] = wire::read_field(transport, "reading handshake nonce").await?;
    tracing::debug!("Received handshake nonce");

    let token = auth_token(key, &nonce);
    wire::write_field(transport, &token, "sending handshake token").await?;

    if !wire::read_status(transport, "reading handshake status").await? {
        tracing::warn!("Peer rejected our PIN");
        return Err(TransferError::Authentication(
            "peer rejected the PIN".into(),
        ));
    }

    tracing::debug!("Handshake complete");
    Ok(())
}

/// Responder side: challenge with a nonce and check the answer.
pub async fn respond<T>(key: &SharedSecret, transport: &mut T) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let nonce = fresh_nonce();
    wire::write_field(transport, &nonce, "sending handshake nonce").await?;

    let token: [u8; TOKEN_LEN] = wire::read_field(transport, "reading handshake token").await?;

    if !verify_token(key, &nonce, &token) {
        tracing::warn!("Handshake token mismatch; rejecting peer");
        wire::write_status(transport, false, "sending handshake status").await?;
        return Err(TransferError::Authentication(
            "peer does not know the PIN".into(),
        ));
    }

    wire::write_status(transport, true, "sending handshake status").await?;
    tracing::debug!("Handshake complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{derive_key, KEY_LEN};

    fn key(byte: u8) -> SharedSecret {
        SharedSecret::from_bytes([byte; KEY_LEN])
    }

    #[tokio::test]
    async fn test_matching_keys() -> Result<()> {
        let (mut a, mut b) = tokio::io::duplex(256);
        let (ka, kb) = (key(1), key(1));

        let responder = tokio::spawn(async move { respond(&kb, &mut b).await });
        initiate(&ka, &mut a).await?;
        responder.await.unwrap()?;
        Ok(())
    }

    #[tokio::test]
    async fn test_perform_dispatches_on_role() -> Result<()> {
        let (mut a, mut b) = tokio::io::duplex(256);
        let (ka, kb) = (key(6), key(6));

        let responder = tokio::spawn(async move { perform(Role::Responder, &kb, &mut b).await });
        perform(Role::Initiator, &ka, &mut a).await?;
        responder.await.unwrap()?;
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_pin_fails_on_both_sides() {
        let (mut a, mut b) = tokio::io::duplex(256);
        let ka = derive_key("111111");
        let kb = derive_key("222222");

        let responder = tokio::spawn(async move { respond(&kb, &mut b).await });
        let init_err = initiate(&ka, &mut a).await.unwrap_err();
        let resp_err = responder.await.unwrap().unwrap_err();

        assert!(matches!(init_err, TransferError::Authentication(_)));
        assert!(matches!(resp_err, TransferError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_peer_closes_before_token() {
        let (a, mut b) = tokio::io::duplex(256);
        drop(a);
        let err = respond(&key(3), &mut b).await.unwrap_err();
        assert!(matches!(err, TransferError::ConnectionFault(_)));
    }

    #[test]
    fn test_token_binds_nonce_and_key() {
        let nonce = [9u8; NONCE_LEN];
        let token = auth_token(&key(1), &nonce);
        assert!(verify_token(&key(1), &nonce, &token));
        assert!(!verify_token(&key(2), &nonce, &token));
        assert!(!verify_token(&key(1), &[8u8; NONCE_LEN], &token));
    }

    #[test]
    fn test_nonces_are_fresh() {
        assert_ne!(fresh_nonce(), fresh_nonce());
    }
}
