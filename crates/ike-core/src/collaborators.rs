//! Collaborator interfaces (C6–C8, spec.md §6): named seams into
//! subsystems this crate does not implement. DER parsing, kernel SA/SPD
//! programming, and RSA primitives are explicitly out of scope; these
//! traits are what the session core calls through instead of reaching for
//! a concrete implementation.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::modecfg::message::{AttributePayload, IkeHeader};

/// Opaque authentication key handle (spec.md §3: "authentication keys
/// (opaque handle owned by a crypto collaborator)").
#[derive(Debug, Clone)]
pub struct SkeyidA(pub Vec<u8>);

/// Opaque session-key bundle used to encrypt/decrypt the post-header region
/// of an IKE message.
#[derive(Debug, Clone)]
pub struct SessionKeys(pub Vec<u8>);

/// The HMAC ModeCfg's HASH payload is pinned to (spec.md §6). Key
/// derivation producing `skeyid_a` is a Non-goal; this only consumes it.
pub fn compute_hmac_sha256(key: &SkeyidA, range: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&key.0).expect("HMAC accepts a key of any length");
    mac.update(range);
    mac.finalize().into_bytes().to_vec()
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer too short")]
    Truncated,
    #[error("encrypt/decrypt failure")]
    Crypto,
}

/// Encodes/decodes IKE headers and attribute payloads, and computes the
/// HMAC over a message range. This is the seam spec.md's Non-goals mean
/// when they say "the on-the-wire byte layout of IKE payloads" is
/// delegated; ModeCfg's own layout is pinned in spec.md §6 and lives in
/// [`crate::modecfg::message`], which is built on top of this trait.
pub trait Codec: Send + Sync {
    fn encode_header(&self, header: &IkeHeader) -> Vec<u8>;
    fn decode_header(&self, bytes: &[u8]) -> Result<IkeHeader, CodecError>;

    fn encode_attribute_payload(&self, payload: &AttributePayload) -> Vec<u8>;
    fn decode_attribute_payload(&self, bytes: &[u8]) -> Result<AttributePayload, CodecError>;

    fn compute_hmac(&self, key: &SkeyidA, range: &[u8]) -> Vec<u8>;

    fn encrypt(&self, buffer: &mut Vec<u8>, keys: &SessionKeys) -> Result<(), CodecError>;
    fn decrypt(&self, buffer: &mut Vec<u8>, keys: &SessionKeys) -> Result<(), CodecError>;
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("kernel operation failed: {0}")]
    Failed(String),
}

/// Installs SAs, policies, routes, and virtual IPs (spec.md §6).
#[async_trait]
pub trait Kernel: Send + Sync {
    async fn add_sa(&self, spi: u32, src: IpAddr, dst: IpAddr) -> Result<(), KernelError>;
    async fn del_sa(&self, spi: u32) -> Result<(), KernelError>;
    async fn add_policy(&self, src: IpAddr, dst: IpAddr) -> Result<(), KernelError>;
    async fn del_policy(&self, src: IpAddr, dst: IpAddr) -> Result<(), KernelError>;
    async fn add_route(&self, dst: IpAddr, via: IpAddr) -> Result<(), KernelError>;
    async fn del_route(&self, dst: IpAddr, via: IpAddr) -> Result<(), KernelError>;
    async fn add_ip(&self, addr: Ipv4Addr) -> Result<(), KernelError>;
    async fn del_ip(&self, addr: Ipv4Addr) -> Result<(), KernelError>;
    async fn get_source_addr(&self, dst: IpAddr) -> Result<IpAddr, KernelError>;
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential found for identity {0:?}")]
    NotFound(String),
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Yields public/private keys and identities (spec.md §6).
#[async_trait]
pub trait Credential: Send + Sync {
    async fn get_trusted_public_key(&self, id: &str) -> Result<Vec<u8>, CredentialError>;
    async fn get_rsa_public_key(&self, id: &str) -> Result<Vec<u8>, CredentialError>;
    async fn get_rsa_private_key(&self, pubkey: &[u8]) -> Result<Vec<u8>, CredentialError>;
    async fn sign(&self, key: &[u8], octets: &[u8]) -> Result<Vec<u8>, CredentialError>;
    async fn verify(
        &self,
        key: &[u8],
        octets: &[u8],
        signature: &[u8],
    ) -> Result<(), CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_is_deterministic_and_key_sensitive() {
        let a = compute_hmac_sha256(&SkeyidA(vec![1, 2, 3]), b"msgid-and-attrs");
        let b = compute_hmac_sha256(&SkeyidA(vec![1, 2, 3]), b"msgid-and-attrs");
        let c = compute_hmac_sha256(&SkeyidA(vec![9, 9, 9]), b"msgid-and-attrs");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }
}
