//! Sequential output sinks for transformed documents

use std::collections::BTreeMap;
use std::io::{self, Write};

use log::{debug, warn};

use super::{Dictionary, Document, Object, ObjectId};
use crate::progress::SaveFlags;

/// Header handed to a sink before the first object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkHeader {
    /// PDF version written in the file header
    pub version: String,
    /// Save flags of the pass that feeds the sink
    pub flags: SaveFlags,
}

/// Abstract sequential destination of a progressive pass.
///
/// Calls arrive as `begin`, `write_object`*, then either `finish` or `abort`.
/// After `abort` the sink must not present its content as a valid document.
pub trait ObjectSink {
    fn begin(&mut self, header: &SinkHeader) -> io::Result<()>;

    fn write_object(&mut self, id: ObjectId, object: &Object) -> io::Result<()>;

    fn finish(&mut self, trailer: &Dictionary) -> io::Result<()>;

    fn abort(&mut self);
}

impl<S: ObjectSink + ?Sized> ObjectSink for &mut S {
    fn begin(&mut self, header: &SinkHeader) -> io::Result<()> {
        (**self).begin(header)
    }

    fn write_object(&mut self, id: ObjectId, object: &Object) -> io::Result<()> {
        (**self).write_object(id, object)
    }

    fn finish(&mut self, trailer: &Dictionary) -> io::Result<()> {
        (**self).finish(trailer)
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

impl<S: ObjectSink + ?Sized> ObjectSink for Box<S> {
    fn begin(&mut self, header: &SinkHeader) -> io::Result<()> {
        (**self).begin(header)
    }

    fn write_object(&mut self, id: ObjectId, object: &Object) -> io::Result<()> {
        (**self).write_object(id, object)
    }

    fn finish(&mut self, trailer: &Dictionary) -> io::Result<()> {
        (**self).finish(trailer)
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Idle,
    Writing,
    Finished,
    Aborted,
}

fn out_of_order(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("sink {} out of order", what))
}

/// Sink that rebuilds an in-memory [`Document`]
#[derive(Debug)]
pub struct DocumentSink {
    document: Document,
    state: SinkState,
}

impl DocumentSink {
    pub fn new() -> Self {
        Self {
            document: Document::new(),
            state: SinkState::Idle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == SinkState::Finished
    }

    /// The rebuilt document, only once the pass finished
    pub fn into_document(self) -> Option<Document> {
        match self.state {
            SinkState::Finished => Some(self.document),
            _ => None,
        }
    }
}

impl Default for DocumentSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectSink for DocumentSink {
    fn begin(&mut self, header: &SinkHeader) -> io::Result<()> {
        if self.state != SinkState::Idle {
            return Err(out_of_order("begin"));
        }
        self.document = Document::with_version(header.version.clone());
        self.state = SinkState::Writing;
        Ok(())
    }

    fn write_object(&mut self, id: ObjectId, object: &Object) -> io::Result<()> {
        if self.state != SinkState::Writing {
            return Err(out_of_order("write"));
        }
        self.document.insert(id, object.clone());
        Ok(())
    }

    fn finish(&mut self, trailer: &Dictionary) -> io::Result<()> {
        if self.state != SinkState::Writing {
            return Err(out_of_order("finish"));
        }
        *self.document.trailer_mut() = trailer.clone();
        self.state = SinkState::Finished;
        Ok(())
    }

    fn abort(&mut self) {
        self.document = Document::new();
        self.state = SinkState::Aborted;
    }
}

/// Sink that serializes objects as classic PDF with an xref table.
///
/// Cross-reference data, trailer and `%%EOF` are only written by `finish`,
/// so an aborted output never ends like a complete file.
pub struct PdfWriter<W: Write> {
    writer: W,
    xref_positions: BTreeMap<ObjectId, u64>,
    current_position: u64,
    incremental: bool,
    previous_xref: Option<u64>,
    state: SinkState,
}

impl<W: Write> PdfWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_base_offset(writer, 0)
    }

    /// Writer whose first byte lands at `offset` in the final file
    pub fn with_base_offset(writer: W, offset: u64) -> Self {
        Self {
            writer,
            xref_positions: BTreeMap::new(),
            current_position: offset,
            incremental: false,
            previous_xref: None,
            state: SinkState::Idle,
        }
    }

    /// Offset of the last `startxref` of the file an incremental pass appends to.
    ///
    /// Written as `/Prev` of the appended trailer. Without it an incremental
    /// section stands alone.
    pub fn with_previous_xref(mut self, startxref: u64) -> Self {
        self.previous_xref = Some(startxref);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.state == SinkState::Finished
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(&mut self, version: &str) -> io::Result<()> {
        self.write_bytes(format!("%PDF-{}\n", version).as_bytes())?;
        // Binary comment to ensure file is treated as binary
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])
    }

    fn write_xref(&mut self) -> io::Result<()> {
        // Contiguous runs of object numbers, each entry (offset, generation)
        let mut sections: Vec<(u32, Vec<Option<(u64, u16)>>)> = Vec::new();
        if !self.incremental {
            sections.push((0, vec![None]));
        }
        for (id, position) in &self.xref_positions {
            let entry = Some((*position, id.generation));
            match sections.last_mut() {
                Some((start, entries)) if *start + entries.len() as u32 == id.number => entries.push(entry),
                _ => sections.push((id.number, vec![entry])),
            }
        }

        let mut buf = b"xref\n".to_vec();
        for (start, entries) in &sections {
            writeln!(buf, "{} {}", start, entries.len())?;
            for entry in entries {
                match entry {
                    None => buf.extend_from_slice(b"0000000000 65535 f \n"),
                    Some((position, generation)) => {
                        write!(buf, "{:010} {:05} n \n", position, generation)?
                    }
                }
            }
        }
        self.write_bytes(&buf)
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }
}

impl<W: Write> ObjectSink for PdfWriter<W> {
    fn begin(&mut self, header: &SinkHeader) -> io::Result<()> {
        if self.state != SinkState::Idle {
            return Err(out_of_order("begin"));
        }
        self.incremental = header.flags.contains(SaveFlags::INCREMENTAL);
        if !self.incremental {
            self.write_header(&header.version)?;
        }
        self.state = SinkState::Writing;
        Ok(())
    }

    fn write_object(&mut self, id: ObjectId, object: &Object) -> io::Result<()> {
        if self.state != SinkState::Writing {
            return Err(out_of_order("write"));
        }
        self.xref_positions.insert(id, self.current_position);

        let mut buf = Vec::new();
        write!(buf, "{} {} obj\n", id.number, id.generation)?;
        object.write_to(&mut buf)?;
        buf.extend_from_slice(b"\nendobj\n");
        self.write_bytes(&buf)
    }

    fn finish(&mut self, trailer: &Dictionary) -> io::Result<()> {
        if self.state != SinkState::Writing {
            return Err(out_of_order("finish"));
        }
        let xref_position = self.current_position;
        self.write_xref()?;

        let mut trailer = trailer.clone();
        if !trailer.contains_key("Size") {
            let max = self.xref_positions.keys().next_back().map_or(0, |id| id.number);
            trailer.set("Size", (max + 1) as i64);
        }
        match self.previous_xref {
            Some(prev) if self.incremental => trailer.set("Prev", prev as i64),
            _ => {}
        }

        let mut buf = b"trailer\n".to_vec();
        trailer.write_to(&mut buf)?;
        write!(buf, "\nstartxref\n{}\n%%EOF\n", xref_position)?;
        self.write_bytes(&buf)?;
        self.writer.flush()?;

        debug!("Wrote {} objects, xref at {}", self.xref_positions.len(), xref_position);
        self.state = SinkState::Finished;
        Ok(())
    }

    fn abort(&mut self) {
        if self.state == SinkState::Writing {
            warn!("Aborting PDF output after {} objects", self.xref_positions.len());
        }
        if let Err(e) = self.writer.flush() {
            debug!("Flush on abort failed: {}", e);
        }
        self.state = SinkState::Aborted;
    }
}
