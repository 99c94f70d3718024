//! Questions, resource records and whole messages.

use std::time::{Duration, Instant};

use crate::dns::header::{HEADER_LEN, Header, rcode};
use crate::dns::name::{CompressionTable, Name, decode_name, encode_name};
use crate::dns::rdata::read_rdata;
use crate::error::{Error, Result};

/// A single entry of the question section.
///
/// Also the record store key: equality and hashing cover exactly the
/// name, type and class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: Name,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    pub fn new(name: Name, qtype: u16, qclass: u16) -> Self {
        Self {
            name,
            qtype,
            qclass,
        }
    }

    fn decode(message: &[u8], pos: usize) -> Result<(Self, usize)> {
        let (name, consumed) = decode_name(message, pos)?;
        let pos = pos + consumed;
        let fixed = message.get(pos..pos + 4).ok_or(Error::TruncatedMessage)?;

        let question = Self {
            name,
            qtype: u16::from_be_bytes([fixed[0], fixed[1]]),
            qclass: u16::from_be_bytes([fixed[2], fixed[3]]),
        };
        Ok((question, pos + 4))
    }

    fn encode(&self, table: &mut CompressionTable, out: &mut Vec<u8>) -> Result<()> {
        encode_name(&self.name, table, out)?;
        out.extend_from_slice(&self.qtype.to_be_bytes());
        out.extend_from_slice(&self.qclass.to_be_bytes());
        Ok(())
    }
}

/// A resource record.
///
/// `rdata` is opaque apart from the name expansion done at decode time.
/// `created_at` marks when the record was read and anchors its TTL.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: Name,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
    pub created_at: Instant,
}

impl Record {
    pub fn new(name: Name, rtype: u16, class: u16, ttl: u32, rdata: Vec<u8>) -> Self {
        Self {
            name,
            rtype,
            class,
            ttl,
            rdata,
            created_at: Instant::now(),
        }
    }

    /// The instant after which the record is stale, if representable.
    pub fn expires_at(&self) -> Option<Instant> {
        self.created_at
            .checked_add(Duration::from_secs(u64::from(self.ttl)))
    }

    /// True once `now` is strictly past `created_at + ttl`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|expires_at| now > expires_at)
    }

    fn decode(message: &[u8], pos: usize, now: Instant) -> Result<(Self, usize)> {
        let (name, consumed) = decode_name(message, pos)?;
        let pos = pos + consumed;
        let fixed = message.get(pos..pos + 10).ok_or(Error::TruncatedMessage)?;

        let rtype = u16::from_be_bytes([fixed[0], fixed[1]]);
        let class = u16::from_be_bytes([fixed[2], fixed[3]]);
        let ttl = u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
        let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;

        let rdata_start = pos + 10;
        let rdata = read_rdata(rtype, message, rdata_start, rdlength)?;

        let record = Self {
            name,
            rtype,
            class,
            ttl,
            rdata,
            created_at: now,
        };
        Ok((record, rdata_start + rdlength))
    }

    fn encode(&self, table: &mut CompressionTable, out: &mut Vec<u8>) -> Result<()> {
        let rdlength =
            u16::try_from(self.rdata.len()).map_err(|_| Error::RdataTooLong(self.rdata.len()))?;

        encode_name(&self.name, table, out)?;
        out.extend_from_slice(&self.rtype.to_be_bytes());
        out.extend_from_slice(&self.class.to_be_bytes());
        out.extend_from_slice(&self.ttl.to_be_bytes());
        out.extend_from_slice(&rdlength.to_be_bytes());
        out.extend_from_slice(&self.rdata);
        Ok(())
    }
}

/// Records compare equal when their wire content matches; `created_at`
/// is bookkeeping and is ignored.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.rtype == other.rtype
            && self.class == other.class
            && self.ttl == other.ttl
            && self.rdata == other.rdata
    }
}

impl Eq for Record {}

/// A full DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl Message {
    /// Decode a message, stamping its records with the current time.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_at(data, Instant::now())
    }

    /// Decode a message, stamping its records with `now`.
    ///
    /// Reads exactly the number of entries the header announces for each
    /// section. Bytes after the last section are ignored.
    pub fn decode_at(data: &[u8], now: Instant) -> Result<Self> {
        let header = Header::decode(data)?;
        let mut pos = HEADER_LEN;

        let mut questions = Vec::with_capacity(header.question_count.min(16) as usize);
        for _ in 0..header.question_count {
            let (question, next) = Question::decode(data, pos)?;
            questions.push(question);
            pos = next;
        }

        let mut sections = [
            (header.answer_count, Vec::new()),
            (header.authority_count, Vec::new()),
            (header.additional_count, Vec::new()),
        ];
        for (count, records) in sections.iter_mut() {
            for _ in 0..*count {
                let (record, next) = Record::decode(data, pos, now)?;
                records.push(record);
                pos = next;
            }
        }
        let [(_, answers), (_, authority), (_, additional)] = sections;

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }

    /// Encode the message to wire format.
    ///
    /// Section counts are taken from the sections themselves, and a single
    /// compression table covers every name in the message.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = |len: usize| u16::try_from(len).map_err(|_| Error::TooManyEntries);

        let header = Header {
            question_count: count(self.questions.len())?,
            answer_count: count(self.answers.len())?,
            authority_count: count(self.authority.len())?,
            additional_count: count(self.additional.len())?,
            ..self.header
        };

        let mut out = Vec::with_capacity(512);
        header.write_to(&mut out);

        let mut table = CompressionTable::new();
        for question in &self.questions {
            question.encode(&mut table, &mut out)?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            record.encode(&mut table, &mut out)?;
        }

        Ok(out)
    }

    /// Build the response to `request` carrying `answers`.
    ///
    /// Questions, authority and additional sections are copied from the
    /// request; the header is derived from the request's without touching
    /// it.
    pub fn build_response(request: &Message, answers: Vec<Record>) -> Message {
        let answer_count = u16::try_from(answers.len()).unwrap_or(u16::MAX);

        Message {
            header: request.header.response(rcode::NO_ERROR, answer_count),
            questions: request.questions.clone(),
            answers,
            authority: request.authority.clone(),
            additional: request.additional.clone(),
        }
    }

    /// Build an answerless response to `request` with the given RCODE.
    pub fn error_response(request: &Message, rcode: u8) -> Message {
        let mut header = request.header.response(rcode, 0);
        header.authority_count = 0;
        header.additional_count = 0;

        Message {
            header,
            questions: request.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }
}
