use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::compression::index_stream::IndexStreamReader;
use crate::compression::{vbyte, EncodeType};
use crate::error::{IndexError, Result};

/// Parsed metadata of one posting chunk. Chunk sizes are implicit in the
/// on-disk format: every chunk holds the global chunk size except the last,
/// which holds the remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub number: u32,
    pub chunk_size: u32,
    pub docs_encode: EncodeType,
    pub docs_size: u32,
    pub freqs_encode: EncodeType,
    pub freqs_size: u32,
}

/// Pointer to one term's posting region, with its chunk metadata parsed.
#[derive(Debug, Clone)]
pub struct PostingPointer {
    pub term_id: u32,
    pub posting_start: u64,
    pub posting_count: u32,
    pub chunks_info: Vec<ChunkInfo>,
}

// Raw chunk triplet as stored in chunks-info. The codec byte is only present
// in multi-encode indexes and stays 0 otherwise.
#[derive(Debug)]
struct RawChunkInfo {
    encodes: u8,
    docs_size: u32,
    freqs_size: u32,
}

#[derive(Debug)]
enum VocabEntry {
    // Only the chunks-info location is retained; records are re-read on
    // demand with a seek.
    OnDisk {
        term_id: u32,
        cinfo_start: u64,
        cinfo_size: u32,
    },
    // The raw integer triplets were parsed eagerly at load time.
    InMemory {
        term_id: u32,
        posting_start: u64,
        stored_count: u32,
        chunks: Vec<RawChunkInfo>,
    },
}

/// A persisted index: loads the vocabulary and collection, and materialises
/// (docId -> frequency) postings per term using the per-chunk codec metadata.
#[derive(Debug)]
pub struct Index {
    pub collection_path: PathBuf,
    pub vocabulary_path: PathBuf,
    pub chunksinfo_path: PathBuf,
    pub postings_path: PathBuf,
    loaded: bool,
    chunk_size: u32,
    chunks_info_in_memory: bool,
    chunks_in_memory_count: u64,
    multiencode: bool,
    doc_encode: EncodeType,
    freq_encode: EncodeType,
    collection: FxHashMap<u32, String>,
    vocabulary: FxHashMap<String, VocabEntry>,
}

fn parse_encode_header(byte: u8) -> Result<(EncodeType, EncodeType)> {
    let doc_id = byte >> 4;
    let freq_id = byte & 0x0F;
    let doc_encode = EncodeType::from_id(doc_id).ok_or(IndexError::UnknownEncoding(doc_id))?;
    let freq_encode = EncodeType::from_id(freq_id).ok_or(IndexError::UnknownEncoding(freq_id))?;
    Ok((doc_encode, freq_encode))
}

/// Parses one term's chunks-info record: a Variable-Byte posting start and
/// stored posting count, then per chunk an optional packed codec byte
/// (multi-encode only) and the Variable-Byte docs/freqs blob sizes. Shared by
/// the eager load and the on-demand lookup paths.
fn read_raw_chunks_info(
    reader: &mut IndexStreamReader,
    size: u32,
    multiencode: bool,
) -> Result<(u64, u32, Vec<RawChunkInfo>)> {
    let corrupt = || IndexError::Corrupt("truncated chunks-info record".to_string());
    let raw = reader.raw_read(size as usize)?;
    let (posting_start, offset) = vbyte::decode_number_u64(&raw, 0).ok_or_else(corrupt)?;
    let (stored_count, mut offset) = vbyte::decode_number(&raw, offset).ok_or_else(corrupt)?;

    let mut chunks = Vec::new();
    while offset < raw.len() {
        let mut encodes = 0u8;
        if multiencode {
            encodes = raw[offset];
            offset += 1;
        }
        let (docs_size, next) = vbyte::decode_number(&raw, offset).ok_or_else(corrupt)?;
        let (freqs_size, next) = vbyte::decode_number(&raw, next).ok_or_else(corrupt)?;
        offset = next;
        chunks.push(RawChunkInfo {
            encodes,
            docs_size,
            freqs_size,
        });
    }
    Ok((posting_start, stored_count, chunks))
}

impl Index {
    pub fn new<P: AsRef<Path>>(dirindex: P) -> Self {
        let dir = dirindex.as_ref();
        Self {
            collection_path: dir.join("collection.txt"),
            vocabulary_path: dir.join("vocabulary.txt"),
            chunksinfo_path: dir.join("chunksinfo.bin"),
            postings_path: dir.join("postings.bin"),
            loaded: false,
            chunk_size: 0,
            chunks_info_in_memory: false,
            chunks_in_memory_count: 0,
            multiencode: false,
            doc_encode: EncodeType::VariableByte,
            freq_encode: EncodeType::VariableByte,
            collection: FxHashMap::default(),
            vocabulary: FxHashMap::default(),
        }
    }

    /// Whether all four index files are present on disk.
    pub fn exists(&self) -> bool {
        self.collection_path.exists()
            && self.vocabulary_path.exists()
            && self.chunksinfo_path.exists()
            && self.postings_path.exists()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_multiencode(&self) -> bool {
        self.multiencode
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Number of chunk records held in RAM (0 unless the index was loaded
    /// with `chunks_info_in_memory`).
    pub fn chunks_info_in_memory_count(&self) -> u64 {
        self.chunks_in_memory_count
    }

    fn check_loaded(&self) -> Result<()> {
        if !self.loaded {
            return Err(IndexError::Usage(
                "the index is not loaded (call load() first)".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads the collection and vocabulary. With `chunks_info_in_memory` the
    /// raw chunk triplets of every term are parsed eagerly; otherwise only
    /// (offset, length) pointers are kept and records are re-read per lookup.
    pub fn load(&mut self, chunks_info_in_memory: bool) -> Result<()> {
        if self.loaded {
            return Err(IndexError::Usage("the index is already loaded".to_string()));
        }
        self.chunks_info_in_memory = chunks_info_in_memory;
        self.load_collection()?;
        self.load_vocabulary()?;
        self.loaded = true;
        Ok(())
    }

    fn load_collection(&mut self) -> Result<()> {
        let file = File::open(&self.collection_path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let mut fields = line.splitn(2, '\t');
            let doc_id = fields
                .next()
                .and_then(|f| f.parse::<u32>().ok())
                .ok_or_else(|| IndexError::Corrupt("bad collection line".to_string()))?;
            let doc_name = fields
                .next()
                .ok_or_else(|| IndexError::Corrupt("bad collection line".to_string()))?;
            self.collection.insert(doc_id, doc_name.to_string());
        }
        Ok(())
    }

    /// Reads the 5-byte file header and fixes the mono/multi parse mode for
    /// the lifetime of the load.
    fn load_index_data(&mut self, reader: &mut IndexStreamReader) -> Result<()> {
        reader.seek(0)?;
        self.chunk_size = reader.read(4, 1, EncodeType::ByteBlocks, Some(4), false)?[0];
        let header = reader.read(1, 1, EncodeType::ByteBlocks, Some(1), false)?[0] as u8;
        self.multiencode = header == 0;
        if !self.multiencode {
            let (doc_encode, freq_encode) = parse_encode_header(header)?;
            self.doc_encode = doc_encode;
            self.freq_encode = freq_encode;
        }
        Ok(())
    }

    fn load_vocabulary(&mut self) -> Result<()> {
        let mut reader = IndexStreamReader::open(&self.chunksinfo_path)?;
        self.load_index_data(&mut reader)?;

        let file = File::open(&self.vocabulary_path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let corrupt = || IndexError::Corrupt("bad vocabulary line".to_string());
            let mut fields = line.split('\t');
            let term_id = fields
                .next()
                .and_then(|f| f.parse::<u32>().ok())
                .ok_or_else(corrupt)?;
            let literal = fields.next().ok_or_else(corrupt)?.to_string();
            let cinfo_start = fields
                .next()
                .and_then(|f| f.parse::<u64>().ok())
                .ok_or_else(corrupt)?;
            let cinfo_size = fields
                .next()
                .and_then(|f| f.parse::<u32>().ok())
                .ok_or_else(corrupt)?;

            let entry = if self.chunks_info_in_memory {
                // Vocabulary lines appear in chunks-info order, so the
                // reader just advances sequentially past the header.
                let (posting_start, stored_count, chunks) =
                    read_raw_chunks_info(&mut reader, cinfo_size, self.multiencode)?;
                self.chunks_in_memory_count += chunks.len() as u64;
                VocabEntry::InMemory {
                    term_id,
                    posting_start,
                    stored_count,
                    chunks,
                }
            } else {
                VocabEntry::OnDisk {
                    term_id,
                    cinfo_start,
                    cinfo_size,
                }
            };
            self.vocabulary.insert(literal, entry);
        }
        Ok(())
    }

    pub fn get_collection(&self) -> &FxHashMap<u32, String> {
        &self.collection
    }

    pub fn get_doc_by_id(&self, doc_id: u32) -> Option<&str> {
        self.collection.get(&doc_id).map(String::as_str)
    }

    pub fn term_count(&self) -> usize {
        self.vocabulary.len()
    }

    /// The term literals of this index, in no particular order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.keys().map(String::as_str)
    }

    /// Per-chunk element counts for a posting of `posting_count` elements.
    /// With a chunk size of 0 the whole posting is one chunk.
    fn compute_chunk_sizes(&self, posting_count: u32) -> Vec<u32> {
        if self.chunk_size == 0 {
            return vec![posting_count];
        }
        let chunks = posting_count.div_ceil(self.chunk_size);
        let mut sizes = vec![self.chunk_size; chunks as usize];
        let remainder = posting_count % self.chunk_size;
        if remainder != 0 {
            if let Some(last) = sizes.last_mut() {
                *last = remainder;
            }
        }
        sizes
    }

    fn parse_chunk_info(
        &self,
        raw: &RawChunkInfo,
        chunk_size: u32,
        number: u32,
    ) -> Result<ChunkInfo> {
        let (docs_encode, freqs_encode) = if self.multiencode {
            parse_encode_header(raw.encodes)?
        } else {
            (self.doc_encode, self.freq_encode)
        };
        Ok(ChunkInfo {
            number,
            chunk_size,
            docs_encode,
            docs_size: raw.docs_size,
            freqs_encode,
            freqs_size: raw.freqs_size,
        })
    }

    /// Resolves a term to its posting pointer with parsed chunk metadata.
    /// Returns `None` for terms absent from the vocabulary.
    pub fn get_posting_pointer_by_term(&self, term: &str) -> Result<Option<PostingPointer>> {
        self.check_loaded()?;
        let entry = match self.vocabulary.get(term) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let disk_record;
        let (term_id, posting_start, stored_count, raw_chunks): (u32, u64, u32, &[RawChunkInfo]) =
            match entry {
                VocabEntry::OnDisk {
                    term_id,
                    cinfo_start,
                    cinfo_size,
                } => {
                    let mut reader = IndexStreamReader::open(&self.chunksinfo_path)?;
                    reader.seek(*cinfo_start)?;
                    disk_record = read_raw_chunks_info(&mut reader, *cinfo_size, self.multiencode)?;
                    (*term_id, disk_record.0, disk_record.1, &disk_record.2)
                }
                VocabEntry::InMemory {
                    term_id,
                    posting_start,
                    stored_count,
                    chunks,
                } => (*term_id, *posting_start, *stored_count, chunks),
            };

        // The on-disk count is len - 1.
        let posting_count = stored_count + 1;
        let chunk_sizes = self.compute_chunk_sizes(posting_count);
        if chunk_sizes.len() != raw_chunks.len() {
            return Err(IndexError::Corrupt(format!(
                "expected {} chunks for {} postings, found {}",
                chunk_sizes.len(),
                posting_count,
                raw_chunks.len()
            )));
        }

        let mut chunks_info = Vec::with_capacity(raw_chunks.len());
        for (i, raw) in raw_chunks.iter().enumerate() {
            chunks_info.push(self.parse_chunk_info(raw, chunk_sizes[i], i as u32 + 1)?);
        }
        Ok(Some(PostingPointer {
            term_id,
            posting_start,
            posting_count,
            chunks_info,
        }))
    }

    /// Materialises the (docId -> frequency) posting of a term. Absent terms
    /// yield an empty map.
    pub fn get_posting_by_term(&self, term: &str) -> Result<FxHashMap<u32, u32>> {
        let pointer = match self.get_posting_pointer_by_term(term)? {
            Some(pointer) => pointer,
            None => return Ok(FxHashMap::default()),
        };

        let mut reader = IndexStreamReader::open(&self.postings_path)?;
        reader.seek(pointer.posting_start)?;

        let mut posting =
            FxHashMap::with_capacity_and_hasher(pointer.posting_count as usize, Default::default());
        for c in &pointer.chunks_info {
            let docs = reader.read(
                c.docs_size as usize,
                c.chunk_size as usize,
                c.docs_encode,
                None,
                true,
            )?;
            let freqs = reader.read(
                c.freqs_size as usize,
                c.chunk_size as usize,
                c.freqs_encode,
                None,
                false,
            )?;
            for (doc_id, freq) in docs.into_iter().zip(freqs) {
                posting.insert(doc_id, freq);
            }
        }
        Ok(posting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_round_trip() {
        let byte = (EncodeType::Gamma.id() << 4) | EncodeType::Unary.id();
        let (doc_encode, freq_encode) = parse_encode_header(byte).unwrap();
        assert_eq!(doc_encode, EncodeType::Gamma);
        assert_eq!(freq_encode, EncodeType::Unary);
    }

    #[test]
    fn test_encode_header_rejects_unknown_ids() {
        assert!(matches!(
            parse_encode_header(0x0F),
            Err(IndexError::UnknownEncoding(_))
        ));
        // 0 in either nibble is not a codec id: that value marks the whole
        // index as multi-encode and never appears per chunk.
        assert!(parse_encode_header(0x10).is_err());
    }

    #[test]
    fn test_chunk_size_computation() {
        let mut index = Index::new("unused");
        index.chunk_size = 2;
        assert_eq!(index.compute_chunk_sizes(5), vec![2, 2, 1]);
        assert_eq!(index.compute_chunk_sizes(4), vec![2, 2]);
        assert_eq!(index.compute_chunk_sizes(1), vec![1]);

        index.chunk_size = 0;
        assert_eq!(index.compute_chunk_sizes(7), vec![7]);
    }

    #[test]
    fn test_unloaded_index_is_a_usage_error() {
        let index = Index::new("unused");
        assert!(matches!(
            index.get_posting_pointer_by_term("fox"),
            Err(IndexError::Usage(_))
        ));
    }
}
