//! Chunked binary blob
//!
//! [`Blob`] is the byte sink every binary emitter writes into. Storage is a list of
//! fixed-size chunks so growth never moves bytes already written; a contiguous copy is
//! only made when [`Blob::to_vec`] is called.
//!
//! # Structure
//!
//! - [`Blob`]: write cursor, fixed-width and LEB128 writes, `skip` for reserving space
//! - [`Marker`]: a saved cursor used to come back and backpatch a reserved field
//! - [`BlobReader`]: forward-only streaming over already-written bytes

pub mod leb;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Growable byte buffer made of fixed-size chunks
#[derive(Debug, Clone)]
pub struct Blob {
    chunk_size: usize,
    chunks: Vec<Box<[u8]>>,
    /// Absolute write cursor
    position: usize,
    /// Highest position ever reached by a write or skip
    size: usize,
}

/// Saved write position inside a [`Blob`]
///
/// A marker does not borrow the blob, so writes can continue after it is taken. Pass the
/// blob back in to [`Marker::rewind`] or [`Marker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    chunk: usize,
    offset: usize,
    position: usize,
}

impl Marker {
    /// Chunk index the marker points into
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Offset inside the chunk
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Absolute position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the blob's write cursor back to this marker.
    pub fn rewind(&self, blob: &mut Blob) {
        blob.position = self.position;
    }

    /// Re-capture the blob's current write position.
    pub fn update(&mut self, blob: &Blob) {
        *self = blob.marker();
    }
}

impl Blob {
    /// Create an empty blob with the default chunk size
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create an empty blob with a custom chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "blob chunk size must be positive");
        Self {
            chunk_size,
            chunks: Vec::new(),
            position: 0,
            size: 0,
        }
    }

    /// Chunk size in bytes
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of allocated chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Highest byte position ever written (not the cursor)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current write cursor
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Capture the current write position
    pub fn marker(&self) -> Marker {
        Marker {
            chunk: self.position / self.chunk_size,
            offset: self.position % self.chunk_size,
            position: self.position,
        }
    }

    /// Move the cursor to the high-water mark.
    pub fn seek_end(&mut self) {
        self.position = self.size;
    }

    fn ensure_chunks(&mut self, end: usize) {
        let needed = end.div_ceil(self.chunk_size);
        while self.chunks.len() < needed {
            self.chunks.push(vec![0u8; self.chunk_size].into_boxed_slice());
        }
    }

    fn advance(&mut self, count: usize) {
        self.position += count;
        if self.position > self.size {
            self.size = self.position;
        }
    }

    // ===== Raw writes =====

    /// Write a single byte
    pub fn write_byte(&mut self, value: u8) {
        self.ensure_chunks(self.position + 1);
        let chunk = self.position / self.chunk_size;
        let offset = self.position % self.chunk_size;
        self.chunks[chunk][offset] = value;
        self.advance(1);
    }

    /// Write a byte slice, splitting it across chunk boundaries as needed
    pub fn write(&mut self, bytes: &[u8]) {
        self.ensure_chunks(self.position + bytes.len());
        let mut rest = bytes;
        while !rest.is_empty() {
            let chunk = self.position / self.chunk_size;
            let offset = self.position % self.chunk_size;
            let count = rest.len().min(self.chunk_size - offset);
            self.chunks[chunk][offset..offset + count].copy_from_slice(&rest[..count]);
            self.advance(count);
            rest = &rest[count..];
        }
    }

    /// Move the cursor forward without writing.
    ///
    /// Skipped bytes count towards [`size`](Self::size). Their content is whatever the
    /// chunk held at that offset; a fresh chunk starts zeroed, but callers that rewind
    /// over earlier data must not rely on that.
    pub fn skip(&mut self, count: usize) {
        self.ensure_chunks(self.position + count);
        self.advance(count);
    }

    // ===== Fixed-width writes (little-endian) =====

    /// Write a 16-bit value
    pub fn write_short(&mut self, value: i16) {
        self.write(&value.to_le_bytes());
    }

    /// Write a 32-bit value
    pub fn write_int(&mut self, value: i32) {
        self.write(&value.to_le_bytes());
    }

    /// Write a 64-bit value
    pub fn write_long(&mut self, value: i64) {
        self.write(&value.to_le_bytes());
    }

    /// Write a 32-bit float
    pub fn write_f32(&mut self, value: f32) {
        self.write(&value.to_le_bytes());
    }

    /// Write a 64-bit float
    pub fn write_f64(&mut self, value: f64) {
        self.write(&value.to_le_bytes());
    }

    // ===== LEB128 =====

    /// Write an unsigned LEB128 value
    pub fn write_leb(&mut self, value: u32) {
        leb::encode_unsigned(u64::from(value), |b| self.write_byte(b));
    }

    /// Write a signed LEB128 value
    pub fn write_sleb(&mut self, value: i32) {
        leb::encode_signed(i64::from(value), |b| self.write_byte(b));
    }

    /// Write a signed 64-bit LEB128 value
    pub fn write_sleb64(&mut self, value: i64) {
        leb::encode_signed(value, |b| self.write_byte(b));
    }

    /// Write an unsigned LEB128 value padded to five bytes
    pub fn write_padded_leb(&mut self, value: u32) {
        leb::encode_padded(value, |b| self.write_byte(b));
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_name(&mut self, name: &str) {
        self.write_leb(name.len() as u32);
        self.write(name.as_bytes());
    }

    /// Append the full contents of another blob, streaming chunk by chunk
    pub fn write_blob(&mut self, other: &Blob) {
        let mut reader = other.reader(0);
        reader.read_to(other.size(), |chunk, start, end| self.write(&chunk[start..end]));
    }

    // ===== Reading =====

    /// Create a forward-only reader starting at `start`
    pub fn reader(&self, start: usize) -> BlobReader<'_> {
        assert!(start <= self.size, "blob reader start {} is past size {}", start, self.size);
        BlobReader {
            blob: self,
            position: start,
        }
    }

    /// Materialize the contents as one contiguous buffer
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size);
        let mut reader = self.reader(0);
        reader.read_to(self.size, |chunk, start, end| out.extend_from_slice(&chunk[start..end]));
        out
    }
}

impl Default for Blob {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward-only cursor over a blob's bytes
pub struct BlobReader<'a> {
    blob: &'a Blob,
    position: usize,
}

impl<'a> BlobReader<'a> {
    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Feed every byte range between the current position and `end` to `consumer` as
    /// `(chunk, start, end)` and move to `end`.
    ///
    /// # Panics
    ///
    /// If `end` is before the current position or past the blob size.
    pub fn read_to(&mut self, end: usize, mut consumer: impl FnMut(&'a [u8], usize, usize)) {
        assert!(
            end >= self.position,
            "blob reader cannot move backward from {} to {}",
            self.position,
            end
        );
        assert!(
            end <= self.blob.size,
            "blob reader cannot move past size {} (requested {})",
            self.blob.size,
            end
        );
        let blob = self.blob;
        let chunk_size = blob.chunk_size;
        while self.position < end {
            let chunk = self.position / chunk_size;
            let offset = self.position % chunk_size;
            let count = (end - self.position).min(chunk_size - offset);
            consumer(&blob.chunks[chunk], offset, offset + count);
            self.position += count;
        }
    }

    /// Move to `end` without reading.
    pub fn skip_to(&mut self, end: usize) {
        self.read_to(end, |_, _, _| {});
    }
}
