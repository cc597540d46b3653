//! BGZF (blocked gzip) support.
//!
//! BGZF wraps data in a series of independent gzip members, each at most
//! 64 KiB uncompressed, with the compressed block size recorded in a `BC`
//! extra subfield. Random access uses virtual offsets: the compressed byte
//! offset of a block combined with an uncompressed offset within it.
//!
//! [`BgzfWriter`] produces well-formed output (including the empty EOF
//! block) and reports the virtual offset of the next byte, which the tabix
//! writer records per BED row. Reading BGZF streams whole (for BAM headers
//! and tests) goes through `flate2`'s multi-member gzip decoder.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::read::MultiGzDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

/// Uncompressed size of a full BGZF block, in bytes.
pub const BGZF_BLOCK_SIZE: u64 = 1 << 16;

/// Uncompressed payload written per block; the htslib convention, which
/// leaves headroom for incompressible data within the 64 KiB block limit.
const MAX_BLOCK_PAYLOAD: usize = 0xff00;

/// The empty terminal block marking end-of-file.
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// A position in a BGZF stream: compressed offset of a block plus the
/// uncompressed offset within it, packed as `coffset << 16 | uoffset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    #[inline]
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        Self((compressed << 16) | uncompressed as u64)
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Compressed byte offset of the containing block.
    #[inline]
    pub fn compressed(&self) -> u64 {
        self.0 >> 16
    }

    /// Uncompressed byte offset within the block.
    #[inline]
    pub fn uncompressed(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// The packed 64-bit value.
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Open a BGZF (or plain gzip) file for whole-stream reading.
pub fn reader(path: &Path) -> io::Result<MultiGzDecoder<BufReader<File>>> {
    Ok(MultiGzDecoder::new(BufReader::new(File::open(path)?)))
}

/// Decompress a complete in-memory BGZF stream.
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    MultiGzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// A writer that packs its input into BGZF blocks.
///
/// Call [`finish`](BgzfWriter::finish) to flush the final block and append
/// the EOF marker; dropping the writer without finishing produces a
/// truncated stream.
pub struct BgzfWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
    coffset: u64,
}

impl<W: Write> BgzfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(MAX_BLOCK_PAYLOAD),
            coffset: 0,
        }
    }

    /// Virtual offset of the next byte to be written.
    pub fn virtual_offset(&self) -> VirtualOffset {
        VirtualOffset::new(self.coffset, self.buf.len() as u16)
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.buf)?;
        let deflated = encoder.finish()?;

        let mut crc = Crc::new();
        crc.update(&self.buf);

        let block_len = 26 + deflated.len();
        debug_assert!(block_len <= BGZF_BLOCK_SIZE as usize);

        // Fixed gzip header with FEXTRA set, then the BC subfield carrying
        // the total block length minus one.
        self.inner.write_all(&[
            0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff,
        ])?;
        self.inner.write_u16::<LittleEndian>(6)?; // XLEN
        self.inner.write_all(b"BC")?;
        self.inner.write_u16::<LittleEndian>(2)?;
        self.inner.write_u16::<LittleEndian>((block_len - 1) as u16)?;
        self.inner.write_all(&deflated)?;
        self.inner.write_u32::<LittleEndian>(crc.sum())?;
        self.inner.write_u32::<LittleEndian>(self.buf.len() as u32)?;

        self.coffset += block_len as u64;
        self.buf.clear();
        Ok(())
    }

    /// Flush any buffered data and write the EOF marker, returning the
    /// underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush_block()?;
        self.inner.write_all(&BGZF_EOF)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let space = MAX_BLOCK_PAYLOAD - self.buf.len();
        let take = space.min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        if self.buf.len() == MAX_BLOCK_PAYLOAD {
            self.flush_block()?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_offset_packing() {
        let v = VirtualOffset::new(0x1234, 0x0056);
        assert_eq!(v.raw(), 0x1234_0056);
        assert_eq!(v.compressed(), 0x1234);
        assert_eq!(v.uncompressed(), 0x56);
        assert_eq!(VirtualOffset::from_raw(0), VirtualOffset::default());
    }

    #[test]
    fn test_roundtrip() {
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(b"hello bgzf world\n").unwrap();
        let bytes = writer.finish().unwrap();

        // Starts with a gzip member carrying the BC subfield.
        assert_eq!(&bytes[0..4], &[0x1f, 0x8b, 0x08, 0x04]);
        assert_eq!(&bytes[12..14], b"BC");
        // Ends with the EOF marker.
        assert_eq!(&bytes[bytes.len() - 28..], &BGZF_EOF);

        assert_eq!(decompress(&bytes).unwrap(), b"hello bgzf world\n");
    }

    #[test]
    fn test_multi_block_roundtrip() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(&payload).unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(decompress(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_virtual_offset_advances_per_block() {
        let mut writer = BgzfWriter::new(Vec::new());
        assert_eq!(writer.virtual_offset(), VirtualOffset::new(0, 0));

        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.virtual_offset(), VirtualOffset::new(0, 3));

        // Filling a block moves the compressed offset forward and resets the
        // in-block offset.
        let filler = vec![0u8; MAX_BLOCK_PAYLOAD];
        writer.write_all(&filler).unwrap();
        let v = writer.virtual_offset();
        assert!(v.compressed() > 0);
        assert_eq!(v.uncompressed() as usize, 3);

        writer.finish().unwrap();
    }

    #[test]
    fn test_empty_stream_is_just_eof() {
        let bytes = BgzfWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(&bytes[..], &BGZF_EOF);
        assert!(decompress(&bytes).unwrap().is_empty());
    }
}
