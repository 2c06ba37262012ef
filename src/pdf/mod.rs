//! PDF object graph and output sinks

mod dict;
mod document;
mod object;
mod stream;
mod writer;

pub use dict::Dictionary;
pub use document::Document;
pub use object::{Object, ObjectId};
pub use stream::Stream;
pub use writer::{DocumentSink, ObjectSink, PdfWriter, SinkHeader};
