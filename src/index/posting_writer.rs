use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::compression::index_stream::IndexStreamWriter;
use crate::compression::{vbyte, EncodeType};
use crate::error::{IndexError, Result};
use crate::index::index::Index;

const VOCABULARY_BUFFER: usize = 5 * 1024 * 1024;

/// Codec selection for one posting field: a fixed codec, or a candidate list
/// resolved per chunk by the size-estimating selector.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeChoice {
    Mono(EncodeType),
    Multi(Vec<EncodeType>),
}

impl EncodeChoice {
    pub fn is_multi(&self) -> bool {
        matches!(self, EncodeChoice::Multi(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostingField {
    Docs,
    Freqs,
}

struct MultiencodeStats {
    docs: BufWriter<File>,
    freqs: BufWriter<File>,
}

/// Writes the vocabulary, chunks-info and postings files for a stream of
/// (term, posting) pairs appended in ascending term order. Both the child
/// flush and the final merge go through this path; they only differ in the
/// codec configuration and chunk size handed in.
pub struct PostingWriter {
    pwriter: IndexStreamWriter,
    cwriter: IndexStreamWriter,
    vwriter: BufWriter<File>,
    chunk_size: u32,
    doc_encode: EncodeChoice,
    freq_encode: EncodeChoice,
    multiencode: bool,
    stats: Option<MultiencodeStats>,
    next_term_id: u32,
}

impl PostingWriter {
    /// Creates the three output files and writes the chunks-info header.
    /// `stats_dir` enables the per-chunk codec statistics dump; it only
    /// applies when both fields are multi-encode.
    pub fn create(
        index: &Index,
        chunk_size: u32,
        doc_encode: EncodeChoice,
        freq_encode: EncodeChoice,
        stats_dir: Option<&Path>,
    ) -> Result<Self> {
        let multiencode = doc_encode.is_multi() || freq_encode.is_multi();

        let stats = match stats_dir {
            Some(dir) if doc_encode.is_multi() && freq_encode.is_multi() => {
                let other = dir.join("other");
                std::fs::create_dir_all(&other)?;
                Some(MultiencodeStats {
                    docs: BufWriter::new(File::create(
                        other.join("encoder_docs_statistics.txt"),
                    )?),
                    freqs: BufWriter::new(File::create(
                        other.join("encoder_freqs_statistics.txt"),
                    )?),
                })
            }
            _ => None,
        };

        let vwriter = BufWriter::with_capacity(
            VOCABULARY_BUFFER,
            File::create(&index.vocabulary_path)?,
        );
        let mut writer = Self {
            pwriter: IndexStreamWriter::new(&index.postings_path),
            cwriter: IndexStreamWriter::new(&index.chunksinfo_path),
            vwriter,
            chunk_size,
            doc_encode,
            freq_encode,
            multiencode,
            stats,
            next_term_id: 1,
        };
        writer.write_header()?;
        Ok(writer)
    }

    /// File header: 4-byte big-endian chunk size, then the packed encoding
    /// byte. A zero byte declares the index multi-encode and moves the codec
    /// ids into each chunk's metadata.
    fn write_header(&mut self) -> Result<()> {
        let mut encode_info = 0u8;
        if !self.multiencode {
            if let (EncodeChoice::Mono(doc), EncodeChoice::Mono(freq)) =
                (&self.doc_encode, &self.freq_encode)
            {
                encode_info = (doc.id() << 4) | freq.id();
            }
        }
        self.cwriter.begin_block(false)?;
        self.cwriter
            .write(&[self.chunk_size], EncodeType::ByteBlocks, Some(4))?;
        self.cwriter
            .write(&[encode_info as u32], EncodeType::ByteBlocks, Some(1))?;
        self.cwriter.close_block()?;
        Ok(())
    }

    fn write_field(
        &mut self,
        term: &str,
        field: PostingField,
        numbers: &[u32],
    ) -> Result<(u64, EncodeType)> {
        // Gaps apply to docIds only.
        let use_gaps = field == PostingField::Docs;
        let choice = match field {
            PostingField::Docs => self.doc_encode.clone(),
            PostingField::Freqs => self.freq_encode.clone(),
        };

        let start_byte = self.pwriter.begin_block(use_gaps)?;
        let etype = match &choice {
            EncodeChoice::Mono(etype) => {
                self.pwriter.write(numbers, *etype, None)?;
                *etype
            }
            EncodeChoice::Multi(candidates) => {
                self.pwriter.multiencode_write(numbers, candidates)?
            }
        };
        let (end_byte, _) = self.pwriter.close_block()?;

        if let (Some(stats), EncodeChoice::Multi(_)) = (&mut self.stats, &choice) {
            let writer = match field {
                PostingField::Docs => &mut stats.docs,
                PostingField::Freqs => &mut stats.freqs,
            };
            writeln!(
                writer,
                "Term: {term}; EncodeType: {}; Numbers: {numbers:?}",
                etype.name()
            )?;
        }
        Ok((end_byte - start_byte, etype))
    }

    /// Serialises one term: chunked posting blocks into the postings file,
    /// the matching chunks-info record, and the vocabulary line. Terms must
    /// arrive in ascending literal order; termIds are assigned densely here.
    pub fn append_term(&mut self, term: &str, docs: &FxHashMap<u32, u32>) -> Result<()> {
        if docs.is_empty() {
            return Err(IndexError::Usage(format!(
                "cannot append term '{term}' with an empty posting"
            )));
        }
        let term_id = self.next_term_id;
        self.next_term_id += 1;

        let mut doc_ids: Vec<u32> = docs.keys().copied().collect();
        doc_ids.sort_unstable();
        let freqs: Vec<u32> = doc_ids.iter().map(|doc_id| docs[doc_id]).collect();

        let chunk_size = if self.chunk_size == 0 {
            doc_ids.len()
        } else {
            self.chunk_size as usize
        };

        let cinfo_start = self.cwriter.begin_block(false)?;

        // The posting region starts wherever the previous term ended.
        let (posting_start, _) = self.pwriter.tell();
        self.cwriter
            .raw_write(&vbyte::encode_u64(posting_start), 0)?;
        // The stored count is len - 1; the reader adds it back.
        self.cwriter
            .write(&[doc_ids.len() as u32 - 1], EncodeType::VariableByte, None)?;

        let mut at = 0;
        while at < doc_ids.len() {
            let end = (at + chunk_size).min(doc_ids.len());

            let (docs_size, doc_etype) =
                self.write_field(term, PostingField::Docs, &doc_ids[at..end])?;
            let (freqs_size, freq_etype) =
                self.write_field(term, PostingField::Freqs, &freqs[at..end])?;

            if self.multiencode {
                let encode_info = (doc_etype.id() << 4) | freq_etype.id();
                self.cwriter
                    .write(&[encode_info as u32], EncodeType::ByteBlocks, Some(1))?;
            }
            self.cwriter.write(
                &[docs_size as u32, freqs_size as u32],
                EncodeType::VariableByte,
                None,
            )?;

            at = end;
        }

        let (cinfo_end, _) = self.cwriter.close_block()?;
        let cinfo_size = cinfo_end - cinfo_start;
        writeln!(
            self.vwriter,
            "{term_id}\t{term}\t{cinfo_start}\t{cinfo_size}"
        )?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.pwriter.close()?;
        self.cwriter.close()?;
        self.vwriter.flush()?;
        if let Some(stats) = &mut self.stats {
            stats.docs.flush()?;
            stats.freqs.flush()?;
        }
        Ok(())
    }
}
