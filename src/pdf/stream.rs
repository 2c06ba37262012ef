//! PDF stream object implementation

use std::io::{self, Write};

use super::Dictionary;

/// PDF stream object
///
/// `/Length` always matches the held (raw, possibly encrypted) data.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary
    dictionary: Dictionary,
    /// Raw stream data
    data: Vec<u8>,
}

impl Stream {
    /// Create new stream object
    pub fn new(mut dictionary: Dictionary, data: Vec<u8>) -> Self {
        dictionary.set("Length", data.len() as i64);
        Self { dictionary, data }
    }

    pub fn dict(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dict_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace stream data, keeping `/Length` in step
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.dictionary.set("Length", data.len() as i64);
        self.data = data;
    }

    /// Cross-reference streams are never encrypted
    pub fn is_xref(&self) -> bool {
        self.dictionary.is_type("XRef")
    }

    /// Document-level XMP metadata stream
    pub fn is_metadata(&self) -> bool {
        self.dictionary.is_type("Metadata")
    }

    /// Write stream to output
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.dictionary.write_to(out)?;
        out.write_all(b"\nstream\n")?;
        out.write_all(&self.data)?;
        out.write_all(b"\nendstream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::Object;

    #[test]
    fn test_length_tracks_data() {
        let mut stream = Stream::new(Dictionary::new(), b"Hello World".to_vec());
        assert_eq!(stream.dict().get_integer("Length"), Some(11));

        stream.set_data(vec![0u8; 48]);
        assert_eq!(stream.dict().get_integer("Length"), Some(48));
    }

    #[test]
    fn test_stream_kinds() {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("Metadata"));
        let stream = Stream::new(dict, Vec::new());
        assert!(stream.is_metadata());
        assert!(!stream.is_xref());
    }

    #[test]
    fn test_stream_serialization() {
        let stream = Stream::new(Dictionary::new(), b"abc".to_vec());
        let mut out = Vec::new();
        stream.write_to(&mut out).unwrap();
        assert_eq!(out, b"<</Length 3>>\nstream\nabc\nendstream");
    }
}
