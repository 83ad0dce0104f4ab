//! Collaborator implementations this daemon actually provides.
//!
//! ModeCfg's wire format and HMAC are pinned by spec.md §6 and implemented
//! for real here. X.509/RSA credentials and kernel SA/SPD/route
//! programming are named collaborators this daemon does not implement
//! (C7 Kernel, C8 Credential); every call into them fails loudly instead
//! of silently pretending to succeed.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use ike_core::collaborators::{
    compute_hmac_sha256, Codec, CodecError, Credential, CredentialError, Kernel, KernelError,
    SessionKeys, SkeyidA,
};
use ike_core::modecfg::{AttributePayload, IkeHeader};

pub struct ModeCfgCodec;

impl Codec for ModeCfgCodec {
    fn encode_header(&self, header: &IkeHeader) -> Vec<u8> {
        header.encode().to_vec()
    }

    fn decode_header(&self, bytes: &[u8]) -> Result<IkeHeader, CodecError> {
        IkeHeader::decode(bytes)
    }

    fn encode_attribute_payload(&self, payload: &AttributePayload) -> Vec<u8> {
        payload.encode()
    }

    fn decode_attribute_payload(&self, bytes: &[u8]) -> Result<AttributePayload, CodecError> {
        AttributePayload::decode(bytes)
    }

    fn compute_hmac(&self, key: &SkeyidA, range: &[u8]) -> Vec<u8> {
        compute_hmac_sha256(key, range)
    }

    /// Encrypting the post-header region is an IKE Phase-1 crypto
    /// collaborator's job, not ModeCfg's; this daemon doesn't negotiate
    /// one, so the region passes through unmodified.
    fn encrypt(&self, _buffer: &mut Vec<u8>, _keys: &SessionKeys) -> Result<(), CodecError> {
        Ok(())
    }

    fn decrypt(&self, _buffer: &mut Vec<u8>, _keys: &SessionKeys) -> Result<(), CodecError> {
        Ok(())
    }
}

pub struct NullKernel;

#[async_trait]
impl Kernel for NullKernel {
    async fn add_sa(&self, _spi: u32, _src: IpAddr, _dst: IpAddr) -> Result<(), KernelError> {
        Err(KernelError::Failed("kernel SA/SPD integration is not implemented".into()))
    }

    async fn del_sa(&self, _spi: u32) -> Result<(), KernelError> {
        Err(KernelError::Failed("kernel SA/SPD integration is not implemented".into()))
    }

    async fn add_policy(&self, _src: IpAddr, _dst: IpAddr) -> Result<(), KernelError> {
        Err(KernelError::Failed("kernel SA/SPD integration is not implemented".into()))
    }

    async fn del_policy(&self, _src: IpAddr, _dst: IpAddr) -> Result<(), KernelError> {
        Err(KernelError::Failed("kernel SA/SPD integration is not implemented".into()))
    }

    async fn add_route(&self, _dst: IpAddr, _via: IpAddr) -> Result<(), KernelError> {
        Err(KernelError::Failed("kernel SA/SPD integration is not implemented".into()))
    }

    async fn del_route(&self, _dst: IpAddr, _via: IpAddr) -> Result<(), KernelError> {
        Err(KernelError::Failed("kernel SA/SPD integration is not implemented".into()))
    }

    async fn add_ip(&self, _addr: Ipv4Addr) -> Result<(), KernelError> {
        Err(KernelError::Failed("kernel SA/SPD integration is not implemented".into()))
    }

    async fn del_ip(&self, _addr: Ipv4Addr) -> Result<(), KernelError> {
        Err(KernelError::Failed("kernel SA/SPD integration is not implemented".into()))
    }

    async fn get_source_addr(&self, dst: IpAddr) -> Result<IpAddr, KernelError> {
        Err(KernelError::Failed(format!("no route lookup available for {dst}")))
    }
}

pub struct NullCredential;

#[async_trait]
impl Credential for NullCredential {
    async fn get_trusted_public_key(&self, id: &str) -> Result<Vec<u8>, CredentialError> {
        Err(CredentialError::NotFound(id.to_string()))
    }

    async fn get_rsa_public_key(&self, id: &str) -> Result<Vec<u8>, CredentialError> {
        Err(CredentialError::NotFound(id.to_string()))
    }

    async fn get_rsa_private_key(&self, _pubkey: &[u8]) -> Result<Vec<u8>, CredentialError> {
        Err(CredentialError::NotFound("no private key store configured".to_string()))
    }

    async fn sign(&self, _key: &[u8], _octets: &[u8]) -> Result<Vec<u8>, CredentialError> {
        Err(CredentialError::VerificationFailed)
    }

    async fn verify(
        &self,
        _key: &[u8],
        _octets: &[u8],
        _signature: &[u8],
    ) -> Result<(), CredentialError> {
        Err(CredentialError::VerificationFailed)
    }
}
