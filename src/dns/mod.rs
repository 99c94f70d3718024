//! DNS wire format: names, header, questions, records and messages.

pub mod header;
pub mod message;
pub mod name;
pub mod rdata;

pub use header::{HEADER_LEN, Header, rcode};
pub use message::{Message, Question, Record};
pub use name::{CompressionTable, Name, decode_name, encode_name};
pub use rdata::{CLASS_IN, rtype};
