//! Domain name encoding and decoding.
//!
//! Names travel as length-prefixed labels terminated by a zero byte. A
//! label length byte with the two top bits set is instead the first half
//! of a compression pointer: a 14-bit offset, counted from the start of
//! the message, where reading continues.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Longest label allowed on the wire.
pub const MAX_LABEL_LEN: usize = 63;

/// Longest name allowed on the wire, length bytes and terminator included.
pub const MAX_NAME_LEN: usize = 255;

const POINTER_TAG: u8 = 0b1100_0000;
const MAX_POINTER_OFFSET: usize = 0x3FFF;

/// A domain name as an ordered list of labels.
///
/// Equality and hashing are purely structural, so a `Name` can key the
/// record store no matter which message it was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Name {
    labels: Vec<String>,
}

impl Name {
    /// The root name (no labels).
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Size of the uncompressed wire form.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Case-insensitive comparison, as DNS matching rules require.
    pub fn eq_ignore_case(&self, other: &Name) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(&other.labels)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut labels = Vec::new();
        let mut offset = 0;
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(Error::MalformedName { offset });
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong(label.len()));
            }
            offset += label.len() + 1;
            labels.push(label.to_string());
        }

        let name = Self { labels };
        if name.wire_len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong);
        }
        Ok(name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_str(".");
        }
        f.write_str(&self.labels.join("."))
    }
}

/// Decode the name starting at `start` in `message`.
///
/// `message` must be the whole DNS message, since pointers are offsets
/// from its first byte. Returns the name and the number of bytes it
/// occupies at `start` (a pointer counts as two bytes, whatever it
/// points to).
///
/// Pointers must point strictly before themselves and the decoded name
/// may not exceed [`MAX_NAME_LEN`], so hostile input can neither loop
/// nor grow without bound.
pub fn decode_name(message: &[u8], start: usize) -> Result<(Name, usize)> {
    let mut labels = Vec::new();
    let mut pos = start;
    let mut consumed = None;
    let mut wire_len = 1;

    loop {
        let len = *message.get(pos).ok_or(Error::TruncatedMessage)?;

        match len {
            0 => {
                let consumed = consumed.unwrap_or_else(|| pos + 1 - start);
                return Ok((Name { labels }, consumed));
            }
            1..=63 => {
                let len = len as usize;
                wire_len += len + 1;
                if wire_len > MAX_NAME_LEN {
                    return Err(Error::MalformedName { offset: pos });
                }

                let bytes = message
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(Error::TruncatedMessage)?;
                let label = std::str::from_utf8(bytes)
                    .map_err(|_| Error::MalformedName { offset: pos })?;
                labels.push(label.to_string());
                pos += 1 + len;
            }
            _ if len & POINTER_TAG == POINTER_TAG => {
                let low = *message.get(pos + 1).ok_or(Error::TruncatedMessage)?;
                let target = (((len & !POINTER_TAG) as usize) << 8) | low as usize;
                if target >= pos {
                    return Err(Error::MalformedName { offset: pos });
                }
                consumed.get_or_insert_with(|| pos + 2 - start);
                pos = target;
            }
            // 0b01 and 0b10 label types are reserved.
            _ => return Err(Error::MalformedName { offset: pos }),
        }
    }
}

/// Offsets of names already written into a message, keyed by label
/// sequence.
///
/// One table is shared by every name written into a single message and
/// thrown away once the message is encoded.
#[derive(Debug, Default)]
pub struct CompressionTable {
    offsets: FxHashMap<Box<[String]>, u16>,
}

impl CompressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, labels: &[String]) -> Option<u16> {
        self.offsets.get(labels).copied()
    }

    fn record(&mut self, labels: &[String], offset: usize) {
        if offset > MAX_POINTER_OFFSET || self.offsets.contains_key(labels) {
            return;
        }
        self.offsets.insert(labels.into(), offset as u16);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Append `name` to `out`, compressing against names already in `table`.
///
/// `out` must hold the message from its first byte so that `out.len()`
/// is the offset the name lands at. The longest suffix of `name` that
/// has been written before is replaced by a pointer; every suffix written
/// in full is recorded for later names.
pub fn encode_name(name: &Name, table: &mut CompressionTable, out: &mut Vec<u8>) -> Result<()> {
    let labels = name.labels();
    for label in labels {
        if label.is_empty() {
            return Err(Error::MalformedName { offset: out.len() });
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong(label.len()));
        }
    }
    if name.wire_len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong);
    }

    let (split, pointer) = (0..labels.len())
        .find_map(|i| table.get(&labels[i..]).map(|offset| (i, Some(offset))))
        .unwrap_or((labels.len(), None));

    for i in 0..split {
        table.record(&labels[i..], out.len());
        out.push(labels[i].len() as u8);
        out.extend_from_slice(labels[i].as_bytes());
    }

    match pointer {
        Some(offset) => out.extend_from_slice(&(0xC000 | offset).to_be_bytes()),
        None => out.push(0),
    }

    Ok(())
}
