//! Serialization of the object graph to an output byte stream.
//!
//! `PdfWriter` walks the indirect objects reachable from the catalog and
//! writes each exactly once, in either the classic `xref` table layout or
//! the object-stream layout. Smart mode deduplicates structurally identical
//! dictionaries and streams before they hit the output.

mod object_stream;
mod smart;

pub use object_stream::OBJECT_STREAM_CAPACITY;

use crate::document::{Document, ObjectFlags};
use crate::error::{PdfError, Result};
use crate::names::Name;
use crate::objects::{Dictionary, Object, ObjectId, Reference, Stream, StringFormat};
use object_stream::{ObjectStreamBuilder, XrefBuilder, XrefEntry};
use smart::{canonical_bytes, is_dedup_candidate, SmartCache};

#[cfg(feature = "compression")]
use flate2::{write::ZlibEncoder, Compression};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Encryption collaborator. The writer decides *when* to encrypt; the
/// cipher itself lives behind this trait, keyed by the object being written.
pub trait Encryptor {
    fn encrypt(&self, id: ObjectId, data: &[u8]) -> Vec<u8>;
}

/// Output options.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Deduplicate structurally identical dictionaries and streams.
    pub use_smart_mode: bool,
    /// Pack non-stream objects into object streams and emit a
    /// cross-reference stream instead of the classic table.
    pub use_object_streams: bool,
    /// Deflate stream payloads that do not already declare a filter.
    pub compress_streams: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            use_smart_mode: false,
            use_object_streams: false,
            compress_streams: true,
        }
    }
}

pub struct PdfWriter<W: Write> {
    writer: W,
    config: WriterConfig,
    encryptor: Option<Box<dyn Encryptor>>,
    current_position: u64,
    xref: XrefBuilder,
    smart: SmartCache,
    /// Object number -> id it was deduplicated onto.
    redirects: HashMap<u32, ObjectId>,
    container: Option<(u32, ObjectStreamBuilder)>,
    next_extra_number: u32,
}

impl PdfWriter<BufWriter<File>> {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new_with_writer(BufWriter::new(file)))
    }
}

impl<W: Write> PdfWriter<W> {
    pub fn new_with_writer(writer: W) -> Self {
        Self::with_config(writer, WriterConfig::default())
    }

    pub fn with_config(writer: W, config: WriterConfig) -> Self {
        Self {
            writer,
            config,
            encryptor: None,
            current_position: 0,
            xref: XrefBuilder::new(),
            smart: SmartCache::new(),
            redirects: HashMap::new(),
            container: None,
            next_extra_number: 0,
        }
    }

    pub fn set_encryptor(&mut self, encryptor: Box<dyn Encryptor>) {
        self.encryptor = Some(encryptor);
    }

    /// Writes everything reachable from the catalog, then the
    /// cross-reference section and trailer.
    ///
    /// Flushing an object marks each indirect reference found in its content
    /// as pending, and the pass repeats until nothing new is marked, so the
    /// reachable closure is written without an explicit worklist.
    pub fn write_document(&mut self, document: &mut Document) -> Result<()> {
        self.write_header()?;

        let catalog = document.catalog_ref();
        document.set_flags(catalog.number(), ObjectFlags::MUST_FLUSH);
        loop {
            let pending: Vec<u32> = document
                .object_numbers()
                .into_iter()
                .filter(|&number| {
                    let flags = document.flags(number);
                    flags.contains(ObjectFlags::MUST_FLUSH) && !flags.contains(ObjectFlags::FLUSHED)
                })
                .collect();
            if pending.is_empty() {
                break;
            }
            for number in pending {
                self.write_entry(document, number)?;
            }
        }

        if self.config.use_object_streams {
            self.finish_container()?;
            let xref_position = self.current_position;
            self.write_xref_stream(document, catalog)?;
            self.write_startxref(xref_position)?;
        } else {
            let xref_position = self.current_position;
            self.write_classic_xref(catalog)?;
            self.write_startxref(xref_position)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Serializes one indirect object now.
    ///
    /// Fails if the reference belongs to another document or was already
    /// flushed and released.
    pub fn write_object(&mut self, document: &mut Document, reference: Reference) -> Result<()> {
        if reference.document() != document.id() {
            return Err(PdfError::ForeignReference(reference.id()));
        }
        if reference == document.catalog_ref() {
            return Err(PdfError::Lifecycle(
                "the catalog cannot be flushed directly; write the whole document".to_string(),
            ));
        }
        if document.is_flushed(reference) {
            return Err(PdfError::Lifecycle(format!(
                "object {} was flushed and released; it cannot be written again",
                reference.id()
            )));
        }
        self.write_entry(document, reference.number())
    }

    fn write_entry(&mut self, document: &mut Document, number: u32) -> Result<()> {
        let (generation, object) = match document.entry(number) {
            Some(entry) => (entry.generation, entry.object.clone()),
            None => {
                return Err(PdfError::Structure(format!(
                    "object {number} is not registered in this document"
                )))
            }
        };
        let id = ObjectId::new(number, generation);

        let canonical = if self.config.use_smart_mode && is_dedup_candidate(&object) {
            let canonical = canonical_bytes(document, &object)?;
            if let Some(existing) = self.smart.lookup(&canonical) {
                // Already on disk under another number. Point both numbers
                // at the same entry and release this one unwritten.
                self.redirects.insert(number, existing);
                if let Some(entry) = self.xref.get(existing.number()) {
                    self.xref.set(number, entry);
                }
                document.mark_flushed(number);
                return Ok(());
            }
            Some(canonical)
        } else {
            None
        };

        let packable = self.config.use_object_streams
            && generation == 0
            && !matches!(object, Object::Stream(_));
        if packable {
            let mut body = Vec::new();
            self.serialize_value(document, &object, &mut body)?;
            self.pack_into_container(document, number, body)?;
        } else {
            self.xref.set(
                number,
                XrefEntry::InUse {
                    offset: self.current_position,
                    generation,
                },
            );
            self.write_bytes(format!("{number} {generation} obj\n").as_bytes())?;
            match &object {
                Object::Stream(stream) => self.write_indirect_stream(document, id, stream)?,
                other => {
                    let mut body = Vec::new();
                    self.serialize_value(document, other, &mut body)?;
                    self.write_bytes(&body)?;
                }
            }
            self.write_bytes(b"\nendobj\n")?;
        }

        if let Some(canonical) = canonical {
            self.smart.record(canonical, id);
        }

        self.mark_contained(document, &object)?;
        document.mark_flushed(number);
        Ok(())
    }

    /// Marks every indirect reference in `object`'s content as pending so
    /// the closure loop picks it up.
    fn mark_contained(&self, document: &mut Document, object: &Object) -> Result<()> {
        let mut found = Vec::new();
        collect_references(object, &mut found);
        for reference in found {
            if reference.document() != document.id() {
                return Err(PdfError::ForeignReference(reference.id()));
            }
            if !document.is_flushed(reference) {
                document.set_flags(reference.number(), ObjectFlags::MUST_FLUSH);
            }
        }
        Ok(())
    }

    fn pack_into_container(
        &mut self,
        document: &Document,
        number: u32,
        body: Vec<u8>,
    ) -> Result<()> {
        if self.container.is_none() {
            let container_number = self.allocate_extra_number(document);
            self.container = Some((container_number, ObjectStreamBuilder::new()));
        }
        let (container_number, index, full) = match self.container.as_mut() {
            Some((container_number, builder)) => {
                let index = builder.push(number, body);
                (*container_number, index, builder.is_full())
            }
            // Initialized just above.
            None => return Err(PdfError::Structure("object stream container missing".into())),
        };
        self.xref.set(
            number,
            XrefEntry::Compressed {
                container: container_number,
                index,
            },
        );
        if full {
            self.finish_container()?;
        }
        Ok(())
    }

    fn finish_container(&mut self) -> Result<()> {
        let (number, builder) = match self.container.take() {
            Some(slot) => slot,
            None => return Ok(()),
        };
        if builder.is_empty() {
            return Ok(());
        }
        let stream = builder.build();
        self.xref.set(
            number,
            XrefEntry::InUse {
                offset: self.current_position,
                generation: 0,
            },
        );
        self.write_bytes(format!("{number} 0 obj\n").as_bytes())?;
        let id = ObjectId::new(number, 0);
        self.write_encoded_stream(id, &stream)?;
        self.write_bytes(b"\nendobj\n")?;
        Ok(())
    }

    fn allocate_extra_number(&mut self, document: &Document) -> u32 {
        let floor = document
            .highest_object_number()
            .max(self.xref.max_number())
            .max(self.next_extra_number);
        self.next_extra_number = floor + 1;
        self.next_extra_number
    }

    fn write_header(&mut self) -> Result<()> {
        self.write_bytes(b"%PDF-1.7\n")?;
        // Binary comment so transports treat the file as binary.
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])?;
        Ok(())
    }

    /// Applies the stream pipeline: deflate first, then the encryption
    /// wrapper, with `Length` corrected once the encoded size is known.
    fn write_indirect_stream(
        &mut self,
        document: &Document,
        id: ObjectId,
        stream: &Stream,
    ) -> Result<()> {
        let mut encoded = stream.clone();

        #[cfg(feature = "compression")]
        if self.config.compress_streams && !encoded.has_filters() && !encoded.is_metadata() {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(encoded.data())?;
            let compressed = encoder.finish()?;
            encoded.set_data(compressed);
            encoded.prepend_filter(Name::new("FlateDecode"))?;
        }

        let data = match &self.encryptor {
            Some(encryptor) => encryptor.encrypt(id, encoded.data()),
            None => encoded.data().to_vec(),
        };

        let mut dict = encoded.dictionary().clone();
        dict.set("Length", data.len() as i64);
        let mut out = Vec::new();
        self.serialize_value(document, &Object::Dictionary(dict), &mut out)?;
        self.write_bytes(&out)?;
        self.write_bytes(b"\nstream\n")?;
        self.write_bytes(&data)?;
        self.write_bytes(b"\nendstream")?;
        Ok(())
    }

    /// Writes a writer-produced stream (object-stream container); its
    /// dictionary never holds references into the document.
    fn write_encoded_stream(&mut self, id: ObjectId, stream: &Stream) -> Result<()> {
        let mut encoded = stream.clone();

        #[cfg(feature = "compression")]
        if self.config.compress_streams {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(encoded.data())?;
            let compressed = encoder.finish()?;
            encoded.set_data(compressed);
            encoded.prepend_filter(Name::new("FlateDecode"))?;
        }

        let data = match &self.encryptor {
            Some(encryptor) => encryptor.encrypt(id, encoded.data()),
            None => encoded.data().to_vec(),
        };

        let mut dict = encoded.dictionary().clone();
        dict.set("Length", data.len() as i64);

        let mut out = Vec::new();
        self.serialize_dictionary(&dict, &mut out)?;
        self.write_bytes(&out)?;
        self.write_bytes(b"\nstream\n")?;
        self.write_bytes(&data)?;
        self.write_bytes(b"\nendstream")?;
        Ok(())
    }

    fn serialize_value(&self, document: &Document, object: &Object, out: &mut Vec<u8>) -> Result<()> {
        match object {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(f) => out.extend_from_slice(format_real(*f).as_bytes()),
            Object::Name(name) => name.write_escaped(out),
            Object::String(s) => match s.format() {
                StringFormat::Literal => {
                    out.push(b'(');
                    for &byte in s.as_bytes() {
                        match byte {
                            b'(' => out.extend_from_slice(b"\\("),
                            b')' => out.extend_from_slice(b"\\)"),
                            b'\\' => out.extend_from_slice(b"\\\\"),
                            other => out.push(other),
                        }
                    }
                    out.push(b')');
                }
                StringFormat::Hexadecimal => {
                    out.push(b'<');
                    for byte in s.as_bytes() {
                        out.extend_from_slice(format!("{byte:02X}").as_bytes());
                    }
                    out.push(b'>');
                }
            },
            Object::Array(array) => {
                out.push(b'[');
                for (i, item) in array.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    self.serialize_value(document, item, out)?;
                }
                out.push(b']');
            }
            Object::Dictionary(dict) => {
                out.extend_from_slice(b"<<");
                for (key, value) in dict.iter() {
                    out.extend_from_slice(b"\n");
                    key.write_escaped(out);
                    out.push(b' ');
                    self.serialize_value(document, value, out)?;
                }
                out.extend_from_slice(b"\n>>");
            }
            Object::Stream(stream) => {
                // A stream nested inside a container; the pipeline applies
                // only to indirect stream objects, so the payload goes out
                // as stored.
                let mut dict = stream.dictionary().clone();
                dict.set("Length", stream.data().len() as i64);
                self.serialize_dictionary(&dict, out)?;
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(stream.data());
                out.extend_from_slice(b"\nendstream");
            }
            Object::Reference(reference) => {
                if reference.document() != document.id() {
                    return Err(PdfError::ForeignReference(reference.id()));
                }
                let id = self
                    .redirects
                    .get(&reference.number())
                    .copied()
                    .unwrap_or(reference.id());
                if id.generation() == 0 {
                    out.extend_from_slice(format!("{} 0 R", id.number()).as_bytes());
                } else {
                    out.extend_from_slice(
                        format!("{} {} R", id.number(), id.generation()).as_bytes(),
                    );
                }
            }
        }
        Ok(())
    }

    // Dictionaries produced by the writer itself carry no references, so no
    // document context is needed.
    fn serialize_dictionary(&self, dict: &Dictionary, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(b"<<");
        for (key, value) in dict.iter() {
            out.extend_from_slice(b"\n");
            key.write_escaped(out);
            out.push(b' ');
            match value {
                Object::Reference(id_ref) => {
                    let id = id_ref.id();
                    out.extend_from_slice(
                        format!("{} {} R", id.number(), id.generation()).as_bytes(),
                    );
                }
                other => self.serialize_plain(other, out)?,
            }
        }
        out.extend_from_slice(b"\n>>");
        Ok(())
    }

    fn serialize_plain(&self, object: &Object, out: &mut Vec<u8>) -> Result<()> {
        match object {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(f) => out.extend_from_slice(format_real(*f).as_bytes()),
            Object::Name(name) => name.write_escaped(out),
            Object::Array(array) => {
                out.push(b'[');
                for (i, item) in array.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    self.serialize_plain(item, out)?;
                }
                out.push(b']');
            }
            Object::Dictionary(dict) => self.serialize_dictionary(dict, out)?,
            other => {
                return Err(PdfError::Structure(format!(
                    "unexpected value in writer-produced dictionary: {other:?}"
                )))
            }
        }
        Ok(())
    }

    fn write_classic_xref(&mut self, catalog: Reference) -> Result<()> {
        let section = self.xref.classic_section();
        self.write_bytes(&section)?;

        let mut trailer = Dictionary::new();
        trailer.set("Size", (self.xref.max_number() + 1) as i64);
        trailer.set("Root", Object::Reference(catalog));
        self.write_bytes(b"trailer\n")?;
        let mut out = Vec::new();
        self.serialize_dictionary(&trailer, &mut out)?;
        self.write_bytes(&out)?;
        self.write_bytes(b"\n")?;
        Ok(())
    }

    fn write_xref_stream(&mut self, document: &Document, catalog: Reference) -> Result<()> {
        let number = self.allocate_extra_number(document);
        self.xref.set(
            number,
            XrefEntry::InUse {
                offset: self.current_position,
                generation: 0,
            },
        );
        let size = self.xref.max_number() + 1;
        let mut stream = self.xref.to_stream(size, Object::Reference(catalog));

        #[cfg(feature = "compression")]
        if self.config.compress_streams {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(stream.data())?;
            let compressed = encoder.finish()?;
            stream.set_data(compressed);
            stream.prepend_filter(Name::new("FlateDecode"))?;
        }

        self.write_bytes(format!("{number} 0 obj\n").as_bytes())?;
        // The xref stream is never encrypted.
        let mut dict = stream.dictionary().clone();
        dict.set("Length", stream.data().len() as i64);
        let mut out = Vec::new();
        self.serialize_dictionary(&dict, &mut out)?;
        self.write_bytes(&out)?;
        self.write_bytes(b"\nstream\n")?;
        self.write_bytes(stream.data())?;
        self.write_bytes(b"\nendstream\nendobj\n")?;
        Ok(())
    }

    fn write_startxref(&mut self, xref_position: u64) -> Result<()> {
        self.write_bytes(b"startxref\n")?;
        self.write_bytes(xref_position.to_string().as_bytes())?;
        self.write_bytes(b"\n%%EOF\n")?;
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }
}

fn format_real(value: f64) -> String {
    let formatted = format!("{value:.6}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Collects every indirect reference in the object's direct content,
/// recursing through containers but never through references.
fn collect_references(object: &Object, out: &mut Vec<Reference>) {
    match object {
        Object::Reference(reference) => out.push(*reference),
        Object::Array(array) => {
            for item in array.iter() {
                collect_references(item, out);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter() {
                collect_references(value, out);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dictionary().iter() {
                collect_references(value, out);
            }
        }
        _ => {}
    }
}

impl Document {
    /// Writes the document to `path` with the default configuration.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = PdfWriter::new(path)?;
        writer.write_document(self)
    }

    pub fn save_to_writer<W: Write>(&mut self, writer: W) -> Result<()> {
        let mut writer = PdfWriter::new_with_writer(writer);
        writer.write_document(self)
    }

    pub fn save_with_config<W: Write>(&mut self, writer: W, config: WriterConfig) -> Result<()> {
        let mut writer = PdfWriter::with_config(writer, config);
        writer.write_document(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Array, PdfString};

    fn plain_config() -> WriterConfig {
        WriterConfig {
            use_smart_mode: false,
            use_object_streams: false,
            compress_streams: false,
        }
    }

    fn serialize(document: &Document, object: &Object) -> String {
        let writer = PdfWriter::with_config(Vec::new(), plain_config());
        let mut out = Vec::new();
        writer.serialize_value(document, object, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_primitive_syntax() {
        let doc = Document::new();
        assert_eq!(serialize(&doc, &Object::Null), "null");
        assert_eq!(serialize(&doc, &Object::Boolean(true)), "true");
        assert_eq!(serialize(&doc, &Object::Integer(-42)), "-42");
        assert_eq!(serialize(&doc, &Object::Real(1.5)), "1.5");
        assert_eq!(serialize(&doc, &Object::Real(3.0)), "3");
    }

    #[test]
    fn test_string_syntax() {
        let doc = Document::new();
        let literal = Object::String(PdfString::literal("a(b)c\\"));
        assert_eq!(serialize(&doc, &literal), "(a\\(b\\)c\\\\)");

        let hex = Object::String(PdfString::hexadecimal(vec![0x01, 0xAB]));
        assert_eq!(serialize(&doc, &hex), "<01AB>");
    }

    #[test]
    fn test_array_and_dictionary_syntax() {
        let doc = Document::new();
        let mut array = Array::new();
        array.push(1i64);
        array.push(Name::new("X"));
        assert_eq!(serialize(&doc, &Object::Array(array)), "[1 /X]");

        let mut dict = Dictionary::new();
        dict.set("B", 2i64);
        dict.set("A", 1i64);
        // Keys come out in sorted order.
        assert_eq!(
            serialize(&doc, &Object::Dictionary(dict)),
            "<<\n/A 1\n/B 2\n>>"
        );
    }

    #[test]
    fn test_reference_zero_generation_fast_path() {
        let mut doc = Document::new();
        let reference = doc.add_object(Object::Integer(7));
        let rendered = serialize(&doc, &Object::Reference(reference));
        assert_eq!(rendered, format!("{} 0 R", reference.number()));
    }

    #[test]
    fn test_foreign_reference_is_rejected() {
        let mut other = Document::new();
        let foreign = other.add_object(Object::Integer(7));

        let doc = Document::new();
        let writer = PdfWriter::with_config(Vec::new(), plain_config());
        let mut out = Vec::new();
        let err = writer
            .serialize_value(&doc, &Object::Reference(foreign), &mut out)
            .unwrap_err();
        assert!(matches!(err, PdfError::ForeignReference(_)));
    }

    #[test]
    fn test_header_and_trailer_framing() {
        let mut doc = Document::new();
        let mut buffer = Vec::new();
        {
            let mut writer = PdfWriter::with_config(&mut buffer, plain_config());
            writer.write_document(&mut doc).unwrap();
        }
        let content = String::from_utf8_lossy(&buffer);
        assert!(buffer.starts_with(b"%PDF-1.7\n"));
        assert!(content.contains("trailer"));
        assert!(content.contains("/Root"));
        assert!(content.contains("startxref"));
        assert!(content.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_reachable_closure_is_written() {
        let mut doc = Document::new();
        let leaf = doc.add_object(Object::Integer(5));
        let mut dict = Dictionary::new();
        dict.set("Leaf", leaf);
        let inner = doc.add_object(Object::Dictionary(dict));
        doc.catalog_mut().unwrap().set("Custom", inner);

        // Unreachable from the catalog.
        let orphan = doc.add_object(Object::Integer(99));

        let mut buffer = Vec::new();
        {
            let mut writer = PdfWriter::with_config(&mut buffer, plain_config());
            writer.write_document(&mut doc).unwrap();
        }

        assert!(doc.is_flushed(leaf));
        assert!(doc.is_flushed(inner));
        assert!(!doc.is_flushed(orphan));
        let content = String::from_utf8_lossy(&buffer);
        assert!(content.contains(&format!("{} 0 obj", leaf.number())));
    }

    #[test]
    fn test_rewrite_after_flush_fails() {
        let mut doc = Document::new();
        let reference = doc.add_object(Object::Integer(5));
        let mut buffer = Vec::new();
        let mut writer = PdfWriter::with_config(&mut buffer, plain_config());
        writer.write_object(&mut doc, reference).unwrap();

        let err = writer.write_object(&mut doc, reference).unwrap_err();
        assert!(matches!(err, PdfError::Lifecycle(_)));
    }

    #[test]
    fn test_stream_gets_flate_filter() {
        #[cfg(feature = "compression")]
        {
            let mut doc = Document::new();
            let stream = Stream::new(b"BT /F1 12 Tf ET".to_vec());
            let reference = doc.add_object(Object::Stream(stream));

            let mut buffer = Vec::new();
            let config = WriterConfig {
                compress_streams: true,
                ..plain_config()
            };
            let mut writer = PdfWriter::with_config(&mut buffer, config);
            writer.write_object(&mut doc, reference).unwrap();

            let content = String::from_utf8_lossy(&buffer);
            assert!(content.contains("/Filter /FlateDecode"));
            assert!(content.contains("stream\n"));
        }
    }

    #[test]
    fn test_prefiltered_stream_is_not_recompressed() {
        let mut doc = Document::new();
        let mut stream = Stream::new(b"already encoded".to_vec());
        stream
            .dictionary_mut()
            .set("Filter", Name::new("DCTDecode"));
        let reference = doc.add_object(Object::Stream(stream));

        let mut buffer = Vec::new();
        let config = WriterConfig {
            compress_streams: true,
            ..plain_config()
        };
        let mut writer = PdfWriter::with_config(&mut buffer, config);
        writer.write_object(&mut doc, reference).unwrap();

        let content = String::from_utf8_lossy(&buffer);
        assert!(content.contains("/Filter /DCTDecode"));
        assert!(!content.contains("FlateDecode"));
        assert!(content.contains("already encoded"));
    }

    #[test]
    fn test_stream_length_matches_encrypted_payload() {
        struct Xor;
        impl Encryptor for Xor {
            fn encrypt(&self, _id: ObjectId, data: &[u8]) -> Vec<u8> {
                data.iter().map(|b| b ^ 0x5a).collect()
            }
        }

        let mut doc = Document::new();
        let reference = doc.add_object(Object::Stream(Stream::new(b"secret".to_vec())));

        let mut buffer = Vec::new();
        let mut writer = PdfWriter::with_config(&mut buffer, plain_config());
        writer.set_encryptor(Box::new(Xor));
        writer.write_object(&mut doc, reference).unwrap();

        let content = String::from_utf8_lossy(&buffer);
        assert!(content.contains("/Length 6"));
        assert!(!buffer.windows(6).any(|w| w == b"secret"));
    }

    #[test]
    fn test_smart_mode_dedups_identical_dictionaries() {
        let mut doc = Document::new();
        let mut a = Dictionary::new();
        a.set("Width", 100i64);
        a.set("Height", 50i64);
        let b = a.clone();
        let ref_a = doc.add_object(Object::Dictionary(a));
        let ref_b = doc.add_object(Object::Dictionary(b));
        let mut holder = Dictionary::new();
        holder.set("First", ref_a);
        holder.set("Second", ref_b);
        let holder_ref = doc.add_object(Object::Dictionary(holder));
        doc.catalog_mut().unwrap().set("Custom", holder_ref);

        let mut buffer = Vec::new();
        let config = WriterConfig {
            use_smart_mode: true,
            ..plain_config()
        };
        {
            let mut writer = PdfWriter::with_config(&mut buffer, config);
            writer.write_document(&mut doc).unwrap();
        }

        let content = String::from_utf8_lossy(&buffer);
        let occurrences = content.matches("/Width 100").count();
        assert_eq!(occurrences, 1);

        // Both numbers resolve to the same serialized object via aliased
        // xref rows.
        let xref_start = content.rfind("\nxref\n").unwrap() + 1;
        let rows: Vec<&str> = content[xref_start..].lines().collect();
        let row = |number: u32| rows[2 + number as usize];
        assert_eq!(row(ref_a.number()), row(ref_b.number()));
        assert!(doc.is_flushed(ref_a));
        assert!(doc.is_flushed(ref_b));
    }

    #[test]
    fn test_catalog_is_not_writable_directly() {
        let mut doc = Document::new();
        let catalog = doc.catalog_ref();
        let mut buffer = Vec::new();
        let mut writer = PdfWriter::with_config(&mut buffer, plain_config());

        let err = writer.write_object(&mut doc, catalog).unwrap_err();
        assert!(matches!(err, PdfError::Lifecycle(_)));
        assert!(!doc.is_flushed(catalog));
    }

    #[test]
    fn test_smart_mode_keeps_holders_of_distinct_flushed_values() {
        let mut doc = Document::new();
        let x = doc.add_object(Object::String(PdfString::literal("alpha")));
        let y = doc.add_object(Object::String(PdfString::literal("beta")));
        let mut b = Dictionary::new();
        b.set("V", x);
        let mut c = Dictionary::new();
        c.set("V", y);
        let b_ref = doc.add_object(Object::Dictionary(b));
        let c_ref = doc.add_object(Object::Dictionary(c));
        // Everything hangs off the catalog, so the low-numbered values are
        // flushed before the dictionaries holding them.
        let catalog = doc.catalog_mut().unwrap();
        catalog.set("A", x);
        catalog.set("B", y);
        catalog.set("C", b_ref);
        catalog.set("D", c_ref);

        let mut buffer = Vec::new();
        let config = WriterConfig {
            use_smart_mode: true,
            ..plain_config()
        };
        {
            let mut writer = PdfWriter::with_config(&mut buffer, config);
            writer.write_document(&mut doc).unwrap();
        }

        let content = String::from_utf8_lossy(&buffer);
        assert!(content.contains(&format!("{} 0 obj", b_ref.number())));
        assert!(content.contains(&format!("{} 0 obj", c_ref.number())));
        assert!(content.contains("(alpha)"));
        assert!(content.contains("(beta)"));
    }

    #[test]
    fn test_smart_mode_distinguishes_changed_field() {
        let mut doc = Document::new();
        let mut a = Dictionary::new();
        a.set("Width", 100i64);
        let mut b = a.clone();
        b.set("Width", 101i64);
        let ref_a = doc.add_object(Object::Dictionary(a));
        let ref_b = doc.add_object(Object::Dictionary(b));
        let mut holder = Dictionary::new();
        holder.set("First", ref_a);
        holder.set("Second", ref_b);
        let holder_ref = doc.add_object(Object::Dictionary(holder));
        doc.catalog_mut().unwrap().set("Custom", holder_ref);

        let mut buffer = Vec::new();
        let config = WriterConfig {
            use_smart_mode: true,
            ..plain_config()
        };
        {
            let mut writer = PdfWriter::with_config(&mut buffer, config);
            writer.write_document(&mut doc).unwrap();
        }

        let content = String::from_utf8_lossy(&buffer);
        assert!(content.contains("/Width 100"));
        assert!(content.contains("/Width 101"));
    }

    #[test]
    fn test_object_stream_layout() {
        let mut doc = Document::new();
        let value = doc.add_object(Object::Integer(7));
        doc.catalog_mut().unwrap().set("Custom", value);

        let mut buffer = Vec::new();
        let config = WriterConfig {
            use_object_streams: true,
            compress_streams: false,
            use_smart_mode: false,
        };
        {
            let mut writer = PdfWriter::with_config(&mut buffer, config);
            writer.write_document(&mut doc).unwrap();
        }

        let content = String::from_utf8_lossy(&buffer);
        assert!(content.contains("/Type /ObjStm"));
        assert!(content.contains("/Type /XRef"));
        // No classic table in this layout.
        assert!(!content.contains("trailer"));
        assert!(content.contains("startxref"));
    }

    #[test]
    fn test_format_real_minimal_notation() {
        assert_eq!(format_real(0.5), "0.5");
        assert_eq!(format_real(-2.25), "-2.25");
        assert_eq!(format_real(10.0), "10");
        assert_eq!(format_real(0.125), "0.125");
    }
}
