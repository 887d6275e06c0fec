//! Encoded image streams and the seams to external decoders.
//!
//! The engine never runs an entropy decoder itself. Filter chains (flate,
//! CCITT, DCT, JPX, JBIG2) live behind [`ByteSource`], and host-provided
//! fast paths behind [`NativeDecoder`].

use crate::error::Result;
use crate::object::Dict;
use std::fmt::{Debug, Formatter};

/// The filter that produced (or still encodes) a stream's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Unfiltered bytes, or a filter the engine has no special handling for.
    Raw,
    Flate,
    RunLength,
    Ccitt,
    Dct,
    Jpx,
    Jbig2,
}

/// Sample geometry pre-read from a self-describing codestream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    pub bits_per_component: u8,
    pub num_components: u8,
}

/// A resettable byte producer over an encoded image stream.
pub trait ByteSource {
    /// Rewind to the start of the stream.
    fn reset(&mut self);

    /// Read up to `n` bytes. A short result means the encoded data ran dry,
    /// which the pipeline tolerates by dropping the missing pixel rows.
    fn read_bytes(&mut self, n: usize) -> Vec<u8>;

    /// Hand over the full decoded buffer, truncated to `n` bytes, when the
    /// source owns it outright. Sources backed by shared document memory
    /// return `None` and the caller copies instead.
    fn take_bytes(&mut self, _n: usize) -> Option<Vec<u8>> {
        None
    }

    /// The filter this stream was encoded with.
    fn filter(&self) -> Filter {
        Filter::Raw
    }

    /// Sample geometry for self-describing codestreams. JPX decoders must
    /// supply this; for JBIG2 the engine forces 1 bit, 1 component.
    fn layout(&self) -> Option<SampleLayout> {
        None
    }

    /// Ask the decoder to emit RGB regardless of its native color layout.
    /// Honored by DCT decoders for CMYK and grayscale JPEGs.
    fn set_force_rgb(&mut self, _force: bool) {}

    /// Hint the dimensions the renderer will draw at, so a resolution-scalable
    /// decoder can stop early.
    fn set_draw_size(&mut self, _width: u32, _height: u32) {}
}

/// A byte source over an in-memory buffer.
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
    filter: Filter,
    layout: Option<SampleLayout>,
    owned: bool,
}

impl MemorySource {
    /// A source over a buffer the pipeline owns, e.g. the output of a
    /// filter chain. Its buffer may be transferred out without a copy.
    pub fn decoded(data: Vec<u8>, filter: Filter) -> Self {
        Self {
            data,
            pos: 0,
            filter,
            layout: None,
            owned: true,
        }
    }

    /// A source over bytes that alias shared document memory. Reads always
    /// copy.
    pub fn shared(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            filter: Filter::Raw,
            layout: None,
            owned: false,
        }
    }

    /// Attach pre-read sample geometry, as a JPX decoder would.
    pub fn with_layout(mut self, layout: SampleLayout) -> Self {
        self.layout = Some(layout);
        self
    }
}

impl ByteSource for MemorySource {
    fn reset(&mut self) {
        self.pos = 0;
    }

    fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        let end = self.data.len().min(self.pos + n);
        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;

        bytes
    }

    fn take_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        if !self.owned || self.pos != 0 {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        data.truncate(n);

        Some(data)
    }

    fn filter(&self) -> Filter {
        self.filter
    }

    fn layout(&self) -> Option<SampleLayout> {
        self.layout
    }
}

/// An encoded image stream: the image dictionary coupled with its bytes.
pub struct Stream {
    dict: Dict,
    source: Box<dyn ByteSource>,
}

impl Stream {
    /// Create a new stream.
    pub fn new(dict: Dict, source: Box<dyn ByteSource>) -> Self {
        Self { dict, source }
    }

    /// The stream's dictionary.
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    pub(crate) fn dict_mut(&mut self) -> &mut Dict {
        &mut self.dict
    }

    pub(crate) fn reset(&mut self) {
        self.source.reset();
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        self.source.read_bytes(n)
    }

    pub(crate) fn take_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        self.source.take_bytes(n)
    }

    pub(crate) fn filter(&self) -> Filter {
        self.source.filter()
    }

    pub(crate) fn layout(&self) -> Option<SampleLayout> {
        self.source.layout()
    }

    pub(crate) fn set_force_rgb(&mut self, force: bool) {
        self.source.set_force_rgb(force);
    }

    pub(crate) fn set_draw_size(&mut self, width: u32, height: u32) {
        self.source.set_draw_size(width, height);
    }
}

impl Debug for Stream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stream (filter: {:?})", self.source.filter())
    }
}

/// A host-provided fast-path decoder for JPEG/JPX streams.
pub trait NativeDecoder {
    /// Whether the decoder accepts this stream.
    fn can_decode(&self, stream: &Stream) -> bool;

    /// Replace the encoded stream with its decoded counterpart. The
    /// dictionary is carried over unchanged.
    fn decode(&self, stream: Stream) -> Result<Stream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_bytes_under_delivers() {
        let mut source = MemorySource::decoded(vec![1, 2, 3], Filter::Flate);

        assert_eq!(source.read_bytes(2), vec![1, 2]);
        assert_eq!(source.read_bytes(5), vec![3]);
        assert_eq!(source.read_bytes(1), Vec::<u8>::new());

        source.reset();
        assert_eq!(source.read_bytes(8), vec![1, 2, 3]);
    }

    #[test]
    fn owned_buffer_is_transferable() {
        let mut source = MemorySource::decoded(vec![1, 2, 3, 4], Filter::Ccitt);

        assert_eq!(source.take_bytes(3), Some(vec![1, 2, 3]));
    }

    #[test]
    fn shared_buffer_is_not_transferable() {
        let mut source = MemorySource::shared(vec![1, 2, 3, 4]);

        assert_eq!(source.take_bytes(3), None);
        assert_eq!(source.read_bytes(3), vec![1, 2, 3]);
    }

    #[test]
    fn partially_read_buffer_is_not_transferable() {
        let mut source = MemorySource::decoded(vec![1, 2, 3, 4], Filter::Flate);
        let _ = source.read_bytes(1);

        assert_eq!(source.take_bytes(3), None);
    }
}
