//! Message decoding: header block, encoded-words, dates, MIME body
//! extraction, and the combined raw-bytes-to-[`Email`](crate::model::Email)
//! decoder.

pub mod date;
pub mod encoded_word;
pub mod header;
pub mod message;
pub mod mime;

pub use date::parse_date;
pub use encoded_word::decode_encoded_words;
pub use message::decode_message;
