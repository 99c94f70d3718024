//! The fixed 12-byte message header.

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 12;

const QR: u16 = 0x8000;
const OPCODE_MASK: u16 = 0x7800;
const AA: u16 = 0x0400;
const TC: u16 = 0x0200;
const RD: u16 = 0x0100;
const RA: u16 = 0x0080;
const RCODE_MASK: u16 = 0x000F;

/// Response codes this resolver emits.
pub mod rcode {
    pub const NO_ERROR: u8 = 0;
    pub const SERVER_FAILURE: u8 = 2;
}

/// A DNS message header.
///
/// `flags` packs QR, Opcode, AA, TC, RD, RA, Z and RCODE exactly as on the
/// wire. The section counts reflect what was decoded; encoding a message
/// recomputes them from the sections actually written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

impl Header {
    /// Decode the header at the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let bytes = data.get(..HEADER_LEN).ok_or(Error::TruncatedMessage)?;
        let field = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);

        Ok(Self {
            id: field(0),
            flags: field(2),
            question_count: field(4),
            answer_count: field(6),
            authority_count: field(8),
            additional_count: field(10),
        })
    }

    /// Append the 12 header bytes to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for field in [
            self.id,
            self.flags,
            self.question_count,
            self.answer_count,
            self.authority_count,
            self.additional_count,
        ] {
            out.extend_from_slice(&field.to_be_bytes());
        }
    }

    /// Derive the header of a response to this request.
    ///
    /// Copies the id, opcode and RD bit, sets QR and RA, and uses the given
    /// RCODE and answer count. The request header is left untouched.
    pub fn response(&self, rcode: u8, answer_count: u16) -> Header {
        let flags = QR | (self.flags & (OPCODE_MASK | RD)) | RA | (rcode as u16 & RCODE_MASK);

        Header {
            id: self.id,
            flags,
            question_count: self.question_count,
            answer_count,
            authority_count: self.authority_count,
            additional_count: self.additional_count,
        }
    }

    pub fn is_response(&self) -> bool {
        self.flags & QR != 0
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags & OPCODE_MASK) >> 11) as u8
    }

    pub fn is_authoritative(&self) -> bool {
        self.flags & AA != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & TC != 0
    }

    pub fn recursion_desired(&self) -> bool {
        self.flags & RD != 0
    }

    pub fn recursion_available(&self) -> bool {
        self.flags & RA != 0
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & RCODE_MASK) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reads_all_fields() {
        let data = [
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04,
        ];

        let header = Header::decode(&data).unwrap();

        assert_eq!(header.id, 0x1234);
        assert_eq!(header.flags, 0x0100);
        assert_eq!(header.question_count, 1);
        assert_eq!(header.answer_count, 2);
        assert_eq!(header.authority_count, 3);
        assert_eq!(header.additional_count, 4);
        assert!(header.recursion_desired());
        assert!(!header.is_response());
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(matches!(
            Header::decode(&[0; 11]),
            Err(Error::TruncatedMessage)
        ));
    }

    #[test]
    fn write_to_matches_decode() {
        let header = Header {
            id: 0xBEEF,
            flags: 0x8180,
            question_count: 1,
            answer_count: 1,
            authority_count: 0,
            additional_count: 1,
        };
        let mut out = Vec::new();

        header.write_to(&mut out);

        assert_eq!(out.len(), HEADER_LEN);
        assert_eq!(Header::decode(&out).unwrap(), header);
    }

    #[test]
    fn response_sets_qr_and_keeps_id() {
        let request = Header {
            id: 0x1234,
            flags: 0x0100,
            question_count: 1,
            ..Header::default()
        };

        let response = request.response(rcode::NO_ERROR, 1);

        assert_eq!(response.id, 0x1234);
        assert!(response.is_response());
        assert!(response.recursion_desired());
        assert!(response.recursion_available());
        assert_eq!(response.rcode(), rcode::NO_ERROR);
        assert_eq!(response.answer_count, 1);
        // The request is a separate value and is never modified.
        assert!(!request.is_response());
        assert_eq!(request.answer_count, 0);
    }

    #[test]
    fn response_carries_opcode_and_rcode() {
        let request = Header {
            flags: 0x2800, // opcode 5 (update), RD clear
            ..Header::default()
        };

        let response = request.response(rcode::SERVER_FAILURE, 0);

        assert_eq!(response.opcode(), 5);
        assert!(!response.recursion_desired());
        assert!(!response.is_authoritative());
        assert!(!response.is_truncated());
        assert_eq!(response.rcode(), rcode::SERVER_FAILURE);
        assert_eq!(response.answer_count, 0);
    }
}
