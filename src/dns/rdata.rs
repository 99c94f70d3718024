//! RDATA handling.
//!
//! RDATA is carried as opaque bytes, with one exception: types that embed
//! domain names may use compression pointers into the message they arrived
//! in. Those names are expanded at decode time so the bytes stay valid
//! once the record is cached or written into a different message.

use crate::dns::name::{CompressionTable, decode_name, encode_name};
use crate::error::{Error, Result};

/// Record type numbers referenced by the resolver.
pub mod rtype {
    pub const A: u16 = 1;
    pub const NS: u16 = 2;
    pub const CNAME: u16 = 5;
    pub const SOA: u16 = 6;
    pub const PTR: u16 = 12;
    pub const MX: u16 = 15;
    pub const AAAA: u16 = 28;
}

/// Class IN.
pub const CLASS_IN: u16 = 1;

/// Read `len` bytes of RDATA of type `rtype` starting at `start` in
/// `message`, expanding any compressed names it contains.
pub fn read_rdata(rtype: u16, message: &[u8], start: usize, len: usize) -> Result<Vec<u8>> {
    let end = start + len;
    let raw = message.get(start..end).ok_or(Error::TruncatedMessage)?;

    let mut out = Vec::with_capacity(len);
    match rtype {
        rtype::NS | rtype::CNAME | rtype::PTR => {
            let pos = copy_name(rtype, message, start, end, &mut out)?;
            expect_end(rtype, pos, end)?;
        }
        rtype::MX => {
            let preference = raw.get(..2).ok_or(Error::MalformedRdata { rtype, offset: start })?;
            out.extend_from_slice(preference);
            let pos = copy_name(rtype, message, start + 2, end, &mut out)?;
            expect_end(rtype, pos, end)?;
        }
        rtype::SOA => {
            let pos = copy_name(rtype, message, start, end, &mut out)?;
            let pos = copy_name(rtype, message, pos, end, &mut out)?;
            // serial, refresh, retry, expire, minimum
            if end - pos != 20 {
                return Err(Error::MalformedRdata { rtype, offset: pos });
            }
            out.extend_from_slice(&message[pos..end]);
        }
        _ => out.extend_from_slice(raw),
    }

    Ok(out)
}

/// Decode the name at `pos`, append it uncompressed and return the offset
/// just past it. The name must end before `end`.
fn copy_name(
    rtype: u16,
    message: &[u8],
    pos: usize,
    end: usize,
    out: &mut Vec<u8>,
) -> Result<usize> {
    if pos >= end {
        return Err(Error::MalformedRdata { rtype, offset: pos });
    }
    let (name, consumed) = decode_name(message, pos)?;
    if pos + consumed > end {
        return Err(Error::MalformedRdata { rtype, offset: pos });
    }
    encode_name(&name, &mut CompressionTable::new(), out)?;
    Ok(pos + consumed)
}

fn expect_end(rtype: u16, pos: usize, end: usize) -> Result<()> {
    if pos != end {
        return Err(Error::MalformedRdata { rtype, offset: pos });
    }
    Ok(())
}
