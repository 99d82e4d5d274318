use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::compression::bit_byte_array::BitByteArray;
use crate::compression::{
    bit_packing, elias_fano, gamma, gaps, pfor, simple16, unary, vbyte, EncodeType,
};
use crate::error::{IndexError, Result};

/// The writer dumps its buffer to disk once it grows past this size.
const AUTO_FLUSH_BYTES: usize = 5 * 1024 * 1024;

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Block-oriented writer for the postings and chunks-info streams. Exactly
/// one block may be open at a time; a block groups the writes of one logical
/// unit (a posting chunk field, a term's chunks-info record) and closes on a
/// byte boundary so every block starts on a fresh byte.
pub struct IndexStreamWriter {
    stream: BitByteArray,
    path: PathBuf,
    file: Option<File>,
    bytes_flushed: u64,
    block_open: bool,
    use_gaps: bool,
    auto_flush: bool,
}

impl IndexStreamWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            stream: BitByteArray::new(),
            path: path.as_ref().to_path_buf(),
            file: None,
            bytes_flushed: 0,
            block_open: false,
            use_gaps: false,
            auto_flush: true,
        }
    }

    /// Current write pointer (bytes, counting a trailing partial byte) and
    /// the padding of the last byte.
    pub fn tell(&self) -> (u64, u32) {
        (
            self.bytes_flushed + self.stream.len() as u64,
            self.stream.padding(),
        )
    }

    /// Opens a write block. `use_gaps` makes every `write` in this block
    /// gap-transform its input first (except under Elias-Fano). Returns the
    /// file-relative byte offset the block starts at.
    pub fn begin_block(&mut self, use_gaps: bool) -> Result<u64> {
        if self.block_open {
            return Err(IndexError::Usage(
                "a write block is already open".to_string(),
            ));
        }
        self.block_open = true;
        self.use_gaps = use_gaps;
        Ok(self.tell().0)
    }

    fn check_block_open(&self) -> Result<()> {
        if !self.block_open {
            return Err(IndexError::Usage("no write block is open".to_string()));
        }
        Ok(())
    }

    /// Finalises the last byte of the open block. Returns the end offset and
    /// the trailing pad bits of the block.
    pub fn close_block(&mut self) -> Result<(u64, u32)> {
        self.check_block_open()?;
        self.block_open = false;
        let old_bit_pointer = self.stream.close_byte();
        let padding = if old_bit_pointer != 0 {
            8 - old_bit_pointer
        } else {
            0
        };
        if self.auto_flush && self.stream.len() >= AUTO_FLUSH_BYTES {
            self.flush()?;
        }
        Ok((self.tell().0, padding))
    }

    /// Appends pre-encoded bytes to the open block.
    pub fn raw_write(&mut self, bytes: &[u8], padding: u32) -> Result<()> {
        self.check_block_open()?;
        self.stream.extend(bytes, padding);
        Ok(())
    }

    fn write_byte_block(&mut self, number: u32, block_size: usize) -> Result<()> {
        if block_size == 0 || block_size > 4 {
            return Err(IndexError::Usage(format!(
                "byte-block size out of range: {block_size}"
            )));
        }
        let be = number.to_be_bytes();
        if be[..4 - block_size].iter().any(|&b| b != 0) {
            return Err(IndexError::Usage(format!(
                "{number} does not fit in a {block_size}-byte block"
            )));
        }
        self.stream.extend(&be[4 - block_size..], 0);
        Ok(())
    }

    /// Encodes the sequence with the given codec into the open block,
    /// gap-transforming first when the block was opened with `use_gaps`
    /// (Elias-Fano always receives the raw values).
    pub fn write(
        &mut self,
        numbers: &[u32],
        etype: EncodeType,
        block_size: Option<usize>,
    ) -> Result<()> {
        self.check_block_open()?;
        let gapped;
        let values: &[u32] = if self.use_gaps && etype.uses_gaps() {
            gapped = gaps::encode(numbers);
            &gapped
        } else {
            numbers
        };
        match etype {
            EncodeType::VariableByte => {
                for &n in values {
                    self.stream.extend(&vbyte::encode(n), 0);
                }
            }
            EncodeType::Unary => {
                for &n in values {
                    let (bytes, padding) = unary::encode(n, true);
                    self.stream.extend(&bytes, padding);
                }
            }
            EncodeType::Gamma => {
                for &n in values {
                    let (bytes, padding) = gamma::encode(n);
                    self.stream.extend(&bytes, padding);
                }
            }
            EncodeType::ByteBlocks => {
                let size = block_size.ok_or_else(|| {
                    IndexError::Usage("ByteBlocks requires an explicit block size".to_string())
                })?;
                for &n in values {
                    self.write_byte_block(n, size)?;
                }
            }
            EncodeType::BitPacking => {
                let (bytes, padding) = bit_packing::encode(values);
                self.stream.extend(&bytes, padding);
            }
            EncodeType::Simple16 => {
                let bytes = words_to_bytes(&simple16::encode(values)?);
                self.stream.extend(&bytes, 0);
            }
            EncodeType::PForDelta => {
                // Short chunks are stored as Variable-Byte; the read path
                // applies the same threshold.
                if numbers.len() >= pfor::MIN_BLOCK {
                    let bytes = words_to_bytes(&pfor::encode(values));
                    self.stream.extend(&bytes, 0);
                } else {
                    for &n in values {
                        self.stream.extend(&vbyte::encode(n), 0);
                    }
                }
            }
            EncodeType::EliasFano => {
                let (bytes, padding) = elias_fano::encode(values);
                self.stream.extend(&bytes, padding);
            }
        }
        Ok(())
    }

    /// Picks the candidate codec that produces the fewest bits for this
    /// sequence and writes with it. Evaluation order and tie-breaks:
    /// PForDelta is the baseline (when applicable), Simple16 is compared by
    /// real encoded size, the parameter-free codecs compete on exact
    /// deterministic size estimates, and Elias-Fano goes strictly last so
    /// that on ties VariableByte wins (single-element sequences are VB bytes
    /// under both, so decode stays correct either way).
    pub fn multiencode_write(
        &mut self,
        numbers: &[u32],
        etypes: &[EncodeType],
    ) -> Result<EncodeType> {
        self.check_block_open()?;
        if etypes.len() < 2 {
            return Err(IndexError::Usage(
                "multi-encode requires at least 2 candidate codecs".to_string(),
            ));
        }
        let gapped;
        let values: &[u32] = if self.use_gaps {
            gapped = gaps::encode(numbers);
            &gapped
        } else {
            numbers
        };

        // (bytes, padding, codec, encoded bits)
        let mut best: Option<(Vec<u8>, u32, EncodeType, u64)> = None;

        // 1. PForDelta baseline, only for sequences long enough to use it.
        if etypes.contains(&EncodeType::PForDelta) && numbers.len() >= pfor::MIN_BLOCK {
            let bytes = words_to_bytes(&pfor::encode(values));
            let bits = bytes.len() as u64 * 8;
            best = Some((bytes, 0, EncodeType::PForDelta, bits));
        }

        // 2. Simple16, silently dropped when a value cannot be represented.
        if etypes.contains(&EncodeType::Simple16) && simple16::fits(values) {
            let bytes = words_to_bytes(&simple16::encode(values)?);
            let bits = bytes.len() as u64 * 8;
            if best.as_ref().map_or(true, |b| bits < b.3) {
                best = Some((bytes, 0, EncodeType::Simple16, bits));
            }
        }

        // 3. Deterministic size estimates for the parameter-free codecs.
        if let Some((etype, bits)) = eval_deterministic_encoders(values, etypes) {
            if best.as_ref().map_or(true, |b| bits < b.3) {
                let (bytes, padding) = match etype {
                    EncodeType::BitPacking => bit_packing::encode(values),
                    _ => {
                        let mut array = BitByteArray::new();
                        for &n in values {
                            match etype {
                                EncodeType::Unary => {
                                    let (bytes, padding) = unary::encode(n, true);
                                    array.extend(&bytes, padding);
                                }
                                EncodeType::Gamma => {
                                    let (bytes, padding) = gamma::encode(n);
                                    array.extend(&bytes, padding);
                                }
                                _ => array.extend(&vbyte::encode(n), 0),
                            }
                        }
                        let padding = array.padding();
                        (array.take_bytes(), padding)
                    }
                };
                best = Some((bytes, padding, etype, bits));
            }
        }

        // 4. Elias-Fano, strictly last and on strict improvement only. Note
        //    the raw (ungapped) values go in; the codec is only defined on
        //    monotone sequences, so anything else skips it.
        if etypes.contains(&EncodeType::EliasFano)
            && numbers.windows(2).all(|pair| pair[0] <= pair[1])
        {
            let (bytes, padding) = elias_fano::encode(numbers);
            let bits = bytes.len() as u64 * 8 - padding as u64;
            if best.as_ref().map_or(true, |b| bits < b.3) {
                best = Some((bytes, padding, EncodeType::EliasFano, bits));
            }
        }

        match best {
            Some((bytes, padding, etype, _)) => {
                self.stream.extend(&bytes, padding);
                Ok(etype)
            }
            None => Err(IndexError::Usage(
                "no applicable codec among the candidates".to_string(),
            )),
        }
    }

    /// Dumps the buffered bytes to disk. The file is created (truncating any
    /// previous index) on the first flush and the handle is kept open for
    /// the writer's lifetime.
    pub fn flush(&mut self) -> Result<()> {
        debug_assert_eq!(self.stream.padding(), 0);
        let file = match &mut self.file {
            Some(file) => file,
            None => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&self.path)?;
                self.file.insert(file)
            }
        };
        let bytes = self.stream.take_bytes();
        self.bytes_flushed += bytes.len() as u64;
        file.write_all(&bytes)?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.block_open {
            return Err(IndexError::Usage(
                "cannot close the stream with an open block".to_string(),
            ));
        }
        self.flush()?;
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        self.file = None;
        Ok(())
    }
}

/// Ranks the parameter-free candidates (Unary, Gamma, BitPacking,
/// VariableByte, in that order) by their exact deterministic encoded sizes.
/// The earliest minimum wins. Unary and gamma only apply to positive values.
fn eval_deterministic_encoders(
    values: &[u32],
    etypes: &[EncodeType],
) -> Option<(EncodeType, u64)> {
    let has_zero = values.contains(&0);
    let mut best: Option<(EncodeType, u64)> = None;
    let mut consider = |etype: EncodeType, bits: u64, best: &mut Option<(EncodeType, u64)>| {
        if best.map_or(true, |(_, smallest)| bits < smallest) {
            *best = Some((etype, bits));
        }
    };
    if etypes.contains(&EncodeType::Unary) && !has_zero {
        consider(EncodeType::Unary, unary::encoded_size(values, true), &mut best);
    }
    if etypes.contains(&EncodeType::Gamma) && !has_zero {
        consider(EncodeType::Gamma, gamma::encoded_size(values), &mut best);
    }
    if etypes.contains(&EncodeType::BitPacking) {
        consider(EncodeType::BitPacking, bit_packing::encoded_size(values), &mut best);
    }
    if etypes.contains(&EncodeType::VariableByte) {
        consider(EncodeType::VariableByte, vbyte::encoded_size(values), &mut best);
    }
    best
}

/// Positioned reader over a postings or chunks-info file.
pub struct IndexStreamReader {
    file: File,
    byte_pointer: u64,
}

impl IndexStreamReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            byte_pointer: 0,
        })
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.byte_pointer = offset;
        Ok(())
    }

    pub fn tell(&self) -> u64 {
        self.byte_pointer
    }

    pub fn raw_read(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        self.file.read_exact(&mut buffer)?;
        self.byte_pointer += size as u64;
        Ok(buffer)
    }

    /// Reads `size` bytes as a self-delimiting Variable-Byte sequence. Used
    /// where the element count is not known up front (chunks-info records,
    /// child subindex merging).
    pub fn read_vb(&mut self, size: usize) -> Result<Vec<u32>> {
        Ok(vbyte::decode(&self.raw_read(size)?))
    }

    fn read_byte_blocks(&mut self, size: usize, block_size: usize) -> Result<Vec<u32>> {
        if block_size == 0 || block_size > 4 {
            return Err(IndexError::Usage(format!(
                "byte-block size out of range: {block_size}"
            )));
        }
        let bytes = self.raw_read(size)?;
        let mut numbers = Vec::with_capacity(bytes.len() / block_size);
        for chunk in bytes.chunks_exact(block_size) {
            let mut value = 0u32;
            for &byte in chunk {
                value = (value << 8) | byte as u32;
            }
            numbers.push(value);
        }
        Ok(numbers)
    }

    /// Reads and decodes `size` bytes as `nums` elements under the declared
    /// codec. Mirrors the writer's two policy rules: a PForDelta chunk below
    /// the block threshold is decoded as Variable-Byte, and the gap inverse
    /// is skipped under Elias-Fano.
    pub fn read(
        &mut self,
        size: usize,
        nums: usize,
        etype: EncodeType,
        block_size: Option<usize>,
        use_gaps: bool,
    ) -> Result<Vec<u32>> {
        let numbers = match etype {
            EncodeType::BitPacking => bit_packing::decode(&self.raw_read(size)?, nums)?,
            EncodeType::Unary => unary::decode(&self.raw_read(size)?, nums, true)?,
            EncodeType::Gamma => gamma::decode(&self.raw_read(size)?, nums)?,
            EncodeType::EliasFano => elias_fano::decode(&self.raw_read(size)?, nums)?,
            EncodeType::Simple16 => {
                simple16::decode(&bytes_to_words(&self.raw_read(size)?), nums)?
            }
            EncodeType::PForDelta if nums >= pfor::MIN_BLOCK => {
                pfor::decode(&bytes_to_words(&self.raw_read(size)?), nums)?
            }
            EncodeType::ByteBlocks => {
                let block_size = block_size.ok_or_else(|| {
                    IndexError::Usage("ByteBlocks requires an explicit block size".to_string())
                })?;
                self.read_byte_blocks(size, block_size)?
            }
            // VariableByte, or a PForDelta chunk short enough to have been
            // written as VB.
            EncodeType::PForDelta | EncodeType::VariableByte => self.read_vb(size)?,
        };
        if numbers.len() != nums {
            return Err(IndexError::CodecMismatch {
                expected: nums,
                decoded: numbers.len(),
            });
        }
        if use_gaps && etype != EncodeType::EliasFano {
            Ok(gaps::decode(&numbers))
        } else {
            Ok(numbers)
        }
    }
}
