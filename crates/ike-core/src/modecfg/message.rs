//! Wire format for ModeCfg messages (spec.md §6).
//!
//! ```text
//! icookie[8] || rcookie[8] || next_payload(1) || version(1) || exchange(1)=0x06
//!   || flags(1) || msgid(4) || length(4)
//! HASH:  next_payload(1)=ATTR || reserved(1) || length(2) || digest[hasher_size]
//! ATTR:  next_payload(1)=NONE || reserved(1) || length(2) || type(1) || reserved(1)
//!   || identifier(2) || attributes…
//! attr:  af_type(2) || length(2) || value[length]
//! ```

use crate::address::AttrKind;
use crate::collaborators::CodecError;
use crate::constants::{EXCHANGE_MODE_CFG, PAYLOAD_HASH, PAYLOAD_NONE};

pub const FLAG_ENCRYPTION: u8 = 0x01;

const HEADER_LEN: usize = 28;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkeHeader {
    pub icookie: [u8; 8],
    pub rcookie: [u8; 8],
    pub next_payload: u8,
    pub version: u8,
    pub exchange: u8,
    pub flags: u8,
    pub msgid: u32,
    pub length: u32,
}

impl IkeHeader {
    pub fn new_mode_cfg(icookie: [u8; 8], rcookie: [u8; 8], msgid: u32) -> Self {
        Self {
            icookie,
            rcookie,
            next_payload: PAYLOAD_HASH,
            version: 0x10,
            exchange: EXCHANGE_MODE_CFG,
            flags: FLAG_ENCRYPTION,
            msgid,
            length: 0,
        }
    }

    pub fn is_mode_cfg(&self) -> bool {
        self.exchange == EXCHANGE_MODE_CFG
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&self.icookie);
        buf[8..16].copy_from_slice(&self.rcookie);
        buf[16] = self.next_payload;
        buf[17] = self.version;
        buf[18] = self.exchange;
        buf[19] = self.flags;
        buf[20..24].copy_from_slice(&self.msgid.to_be_bytes());
        buf[24..28].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        let mut icookie = [0u8; 8];
        let mut rcookie = [0u8; 8];
        icookie.copy_from_slice(&bytes[0..8]);
        rcookie.copy_from_slice(&bytes[8..16]);

        Ok(Self {
            icookie,
            rcookie,
            next_payload: bytes[16],
            version: bytes[17],
            exchange: bytes[18],
            flags: bytes[19],
            msgid: u32::from_be_bytes(bytes[20..24].try_into().unwrap()),
            length: u32::from_be_bytes(bytes[24..28].try_into().unwrap()),
        })
    }
}

pub const HEADER_LEN_BYTES: usize = HEADER_LEN;

/// One TLV attribute: `af_type(2) || length(2) || value[length]`. The high
/// bit of `af_type` selects TV vs TLV; ModeCfg always uses TLV (bit clear).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub kind: u16,
    pub value: Vec<u8>,
}

impl Attribute {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind.to_be_bytes());
        out.extend_from_slice(&(self.value.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.value);
    }

    fn decode(bytes: &[u8]) -> Result<(Attribute, usize), CodecError> {
        if bytes.len() < 4 {
            return Err(CodecError::Truncated);
        }
        let kind = u16::from_be_bytes([bytes[0], bytes[1]]) & 0x7fff;
        let len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if bytes.len() < 4 + len {
            return Err(CodecError::Truncated);
        }
        let value = bytes[4..4 + len].to_vec();
        Ok((Attribute { kind, value }, 4 + len))
    }
}

/// The Attribute payload: a header (type + identifier) plus a sequence of
/// TLV attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePayload {
    /// `REQUEST`/`REPLY`/`SET`/`ACK` (spec.md §4.4).
    pub isama_type: u8,
    pub identifier: u16,
    pub attributes: Vec<Attribute>,
}

impl AttributePayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(self.isama_type);
        body.push(0); // reserved
        body.extend_from_slice(&self.identifier.to_be_bytes());
        for attr in &self.attributes {
            attr.encode(&mut body);
        }

        let mut out = Vec::with_capacity(body.len() + 4);
        out.push(PAYLOAD_NONE);
        out.push(0); // reserved
        out.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < 8 {
            return Err(CodecError::Truncated);
        }
        let payload_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if bytes.len() < payload_len || payload_len < 8 {
            return Err(CodecError::Truncated);
        }

        let isama_type = bytes[4];
        let identifier = u16::from_be_bytes([bytes[6], bytes[7]]);

        let mut attributes = Vec::new();
        let mut cursor = 8;
        while cursor < payload_len {
            let (attr, consumed) = Attribute::decode(&bytes[cursor..payload_len])?;
            attributes.push(attr);
            cursor += consumed;
        }

        Ok(Self {
            isama_type,
            identifier,
            attributes,
        })
    }
}

/// Emits one TLV per present bit in `ia.attr_set`, iterating kinds in
/// ascending order. DNS/NBNS emit a second TLV in the same pass when a
/// second server is configured, per spec.md §4.4's emission algorithm.
pub fn build_attributes(ia: &crate::address::InternalAddress) -> Vec<Attribute> {
    let mut out = Vec::new();

    for kind in ia.attr_set.iter() {
        match kind {
            AttrKind::Ipv4Address => {
                let value = if ia.ipaddr.is_unspecified() {
                    Vec::new()
                } else {
                    ia.ipaddr.octets().to_vec()
                };
                out.push(Attribute {
                    kind: AttrKind::Ipv4Address.wire_value(),
                    value,
                });
            }
            AttrKind::Ipv4Netmask => {
                out.push(Attribute {
                    kind: AttrKind::Ipv4Netmask.wire_value(),
                    value: [0xff, 0xff, 0xff, 0xff].to_vec(),
                });
            }
            AttrKind::Ipv4Subnet => {
                // Dead on the emit path: `get_from_connection` never sets
                // this bit (spec.md §9 Open Questions). Kept so a future
                // extension that does set it gets correct encoding for free.
                let mut value = ia.ipaddr.octets().to_vec();
                value.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
                out.push(Attribute {
                    kind: AttrKind::Ipv4Subnet.wire_value(),
                    value,
                });
            }
            AttrKind::Ipv4Dns => {
                for addr in ia.dns.iter().take(2) {
                    out.push(Attribute {
                        kind: AttrKind::Ipv4Dns.wire_value(),
                        value: addr.octets().to_vec(),
                    });
                }
            }
            AttrKind::Ipv4Nbns => {
                for addr in ia.nbns.iter().take(2) {
                    out.push(Attribute {
                        kind: AttrKind::Ipv4Nbns.wire_value(),
                        value: addr.octets().to_vec(),
                    });
                }
            }
        }
    }

    out
}

/// Parses wire attributes into an `InternalAddress`. Unknown kinds are
/// reported through `on_unknown` (the caller logs and continues) and never
/// appear in the resulting bitset.
pub fn parse_attributes(
    attributes: &[Attribute],
    mut on_unknown: impl FnMut(u16),
) -> Result<crate::address::InternalAddress, CodecError> {
    let mut ia = crate::address::InternalAddress::default();

    for attr in attributes {
        let Some(kind) = AttrKind::from_wire(attr.kind) else {
            on_unknown(attr.kind);
            continue;
        };

        match kind {
            AttrKind::Ipv4Address => {
                // A zero-length value is a request marker ("give me an
                // address"), not a 4-byte value (spec.md §4.4's emit table:
                // "4-byte address if non-any, else zero-length").
                if !attr.value.is_empty() {
                    if attr.value.len() != 4 {
                        return Err(CodecError::Truncated);
                    }
                    ia.ipaddr = std::net::Ipv4Addr::new(
                        attr.value[0],
                        attr.value[1],
                        attr.value[2],
                        attr.value[3],
                    );
                }
                ia.attr_set.insert(AttrKind::Ipv4Address);
            }
            AttrKind::Ipv4Netmask | AttrKind::Ipv4Subnet => {
                ia.attr_set.insert(kind);
            }
            AttrKind::Ipv4Dns => {
                if !attr.value.is_empty() {
                    if attr.value.len() != 4 {
                        return Err(CodecError::Truncated);
                    }
                    if ia.dns.len() < 2 {
                        ia.dns.push(std::net::Ipv4Addr::new(
                            attr.value[0],
                            attr.value[1],
                            attr.value[2],
                            attr.value[3],
                        ));
                    }
                }
                ia.attr_set.insert(AttrKind::Ipv4Dns);
            }
            AttrKind::Ipv4Nbns => {
                if !attr.value.is_empty() {
                    if attr.value.len() != 4 {
                        return Err(CodecError::Truncated);
                    }
                    if ia.nbns.len() < 2 {
                        ia.nbns.push(std::net::Ipv4Addr::new(
                            attr.value[0],
                            attr.value[1],
                            attr.value[2],
                            attr.value[3],
                        ));
                    }
                }
                ia.attr_set.insert(AttrKind::Ipv4Nbns);
            }
        }
    }

    Ok(ia)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ISAMA_REPLY;
    use std::net::Ipv4Addr;

    #[test]
    fn header_round_trips() {
        let header = IkeHeader::new_mode_cfg([1; 8], [2; 8], 42);
        let bytes = header.encode();
        let decoded = IkeHeader::decode(&bytes).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn address_and_netmask_round_trip() {
        let mut ia = crate::address::InternalAddress::default();
        ia.ipaddr = Ipv4Addr::new(10, 1, 2, 3);
        ia.attr_set.insert(AttrKind::Ipv4Address);
        ia.attr_set.insert(AttrKind::Ipv4Netmask);

        let attrs = build_attributes(&ia);
        assert_eq!(attrs.len(), 2);

        let payload = AttributePayload {
            isama_type: ISAMA_REPLY,
            identifier: 7,
            attributes: attrs,
        };
        let encoded = payload.encode();
        let decoded = AttributePayload::decode(&encoded).unwrap();

        let mut unknown = Vec::new();
        let parsed = parse_attributes(&decoded.attributes, |k| unknown.push(k)).unwrap();

        assert!(unknown.is_empty());
        assert_eq!(parsed.ipaddr, ia.ipaddr);
        assert_eq!(
            parsed.attr_set.intersection(ia.attr_set),
            ia.attr_set
        );
    }

    #[test]
    fn two_dns_servers_emit_two_tlvs() {
        let mut ia = crate::address::InternalAddress::default();
        ia.dns = vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)];
        ia.attr_set.insert(AttrKind::Ipv4Dns);

        let attrs = build_attributes(&ia);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].value, vec![8, 8, 8, 8]);
        assert_eq!(attrs[1].value, vec![8, 8, 4, 4]);
    }

    #[test]
    fn unknown_attribute_kind_is_reported_and_skipped() {
        let attrs = vec![
            Attribute {
                kind: 99,
                value: vec![1, 2, 3, 4],
            },
            Attribute {
                kind: AttrKind::Ipv4Dns.wire_value(),
                value: vec![1, 1, 1, 1],
            },
        ];

        let mut unknown = Vec::new();
        let ia = parse_attributes(&attrs, |k| unknown.push(k)).unwrap();

        assert_eq!(unknown, vec![99]);
        assert!(ia.attr_set.contains(AttrKind::Ipv4Dns));
        assert_eq!(ia.dns, vec![Ipv4Addr::new(1, 1, 1, 1)]);
    }

    #[test]
    fn subnet_emission_is_unreachable_from_get_from_connection() {
        use crate::connection::{get_from_connection, Connection};
        use std::net::Ipv4Addr as A;

        let conn = Connection::new("x", A::new(1, 1, 1, 1), A::new(2, 2, 2, 2))
            .with_host_srcip(A::new(10, 0, 0, 1));
        let ia = get_from_connection(&conn);
        assert!(!ia.attr_set.contains(AttrKind::Ipv4Subnet));
    }
}
