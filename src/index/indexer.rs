use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::compression::index_stream::IndexStreamReader;
use crate::compression::{gaps, EncodeType};
use crate::error::{IndexError, Result};
use crate::index::child_indexer::ChildIndexer;
use crate::index::index::Index;
use crate::index::posting_writer::{EncodeChoice, PostingWriter};

/// Default ceiling on concurrent child indexers.
pub const MAX_CHILD_INDEXERS: usize = 4;

/// Default in-memory document cap per TREC worker before a subindex spill.
pub const MAX_TREC_DOCS_IN_MEMORY: usize = 1_500_000;

/// Default memory/parallelism trade-off in (0, 1]. For workers it scales the
/// pool size; for the merge it scales how many subindexes keep their
/// chunks-info in RAM.
pub const RESOURCES_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CorpusType {
    Text,
    Html,
    Trec,
}

impl FromStr for CorpusType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "Text" => Ok(CorpusType::Text),
            "Html" => Ok(CorpusType::Html),
            "Trec" => Ok(CorpusType::Trec),
            other => Err(format!("unknown corpus type: {other}")),
        }
    }
}

/// Build outcome. `AlreadyIndexed` is deliberately not an error: the index is
/// complete and usable, it just was not rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerStatus {
    AlreadyIndexed,
    Ok,
}

pub(crate) fn write_collection(path: &Path, docs: &BTreeMap<u32, String>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (doc_id, doc_name) in docs {
        writeln!(writer, "{doc_id}\t{doc_name}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Corpus indexer: partitions the input files over a pool of SPIMI workers,
/// waits for their subindexes and merges them into the final index with the
/// configured codecs and chunk size.
pub struct Indexer {
    pub doc_encode: EncodeChoice,
    pub freq_encode: EncodeChoice,
    pub max_workers: usize,
    pub resources_factor: f64,
    pub max_trec_docs_in_memory: usize,
    dirin: PathBuf,
    dirout: PathBuf,
    dirtmp: PathBuf,
    corpus_type: CorpusType,
    reuse_tmp: bool,
    chunk_size: u32,
    child_indexes: Vec<Index>,
}

impl Indexer {
    pub fn new<P: AsRef<Path>>(dirin: P, corpus_type: CorpusType, reuse_tmp: bool) -> Self {
        Self {
            doc_encode: EncodeChoice::Mono(EncodeType::VariableByte),
            freq_encode: EncodeChoice::Mono(EncodeType::VariableByte),
            max_workers: MAX_CHILD_INDEXERS,
            resources_factor: RESOURCES_FACTOR,
            max_trec_docs_in_memory: MAX_TREC_DOCS_IN_MEMORY,
            dirin: dirin.as_ref().to_path_buf(),
            dirout: PathBuf::new(),
            dirtmp: PathBuf::new(),
            corpus_type,
            reuse_tmp,
            chunk_size: 0,
            child_indexes: Vec::new(),
        }
    }

    /// Builds the index under `dirout`. Returns the index together with a
    /// status: an existing complete index is returned untouched unless
    /// `overwrite` is set. A chunk size of 0 stores each posting as a single
    /// chunk.
    pub fn create_index(
        &mut self,
        dirout: &Path,
        overwrite: bool,
        chunk_size: u32,
    ) -> Result<(Index, IndexerStatus)> {
        println!("indexing in progress...");
        self.dirout = dirout.to_path_buf();
        self.dirtmp = dirout.join("tmp");
        self.chunk_size = chunk_size;

        let index = Index::new(dirout);
        if index.exists() && !overwrite {
            println!("already indexed");
            return Ok((index, IndexerStatus::AlreadyIndexed));
        }
        if !self.dirin.is_dir() {
            return Err(IndexError::CorpusNotFound(
                self.dirin.display().to_string(),
            ));
        }
        std::fs::create_dir_all(&self.dirout)?;

        let mut child_dirs = Vec::new();
        if self.reuse_tmp {
            child_dirs = self.find_existing_subindexes()?;
        }
        if child_dirs.is_empty() {
            println!("building temporary subindexes...");
            let started = Instant::now();
            child_dirs = self.create_child_indexes()?;
            println!(
                "temporary subindex build time: {:.2}s",
                started.elapsed().as_secs_f64()
            );
        } else {
            println!("reusing existing temporary subindexes");
        }
        if child_dirs.is_empty() {
            return Err(IndexError::Usage(format!(
                "no subindexes produced for corpus {}",
                self.dirin.display()
            )));
        }

        self.child_indexes = child_dirs.iter().map(Index::new).collect();
        let started = Instant::now();
        self.merge_child_indexes(&index)?;
        let merge_seconds = started.elapsed().as_secs_f64();
        self.write_status(&index, merge_seconds)?;

        Ok((index, IndexerStatus::Ok))
    }

    /// Removes the per-child subindex files. Callable once the merge is done;
    /// the final index never reads them again.
    pub fn clear_temporary_indexes(&mut self) -> Result<()> {
        self.child_indexes.clear();
        if self.dirtmp.is_dir() {
            std::fs::remove_dir_all(&self.dirtmp)?;
        }
        Ok(())
    }

    fn find_existing_subindexes(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        if !self.dirtmp.is_dir() {
            return Ok(dirs);
        }
        for entry in std::fs::read_dir(&self.dirtmp)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn walk_corpus(dir: &Path, fnames: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::walk_corpus(&path, fnames)?;
            } else {
                fnames.push(path);
            }
        }
        Ok(())
    }

    /// Splits the corpus files into contiguous per-worker slices. DocIds (for
    /// Text/Html, the file ids) are assigned globally before any worker
    /// starts, which keeps them unique across workers and makes the merge a
    /// plain union.
    fn compute_child_partitions(&self) -> Result<Vec<Vec<(u32, PathBuf)>>> {
        let mut fnames = Vec::new();
        Self::walk_corpus(&self.dirin, &mut fnames)?;
        fnames.sort();
        if fnames.is_empty() {
            return Ok(Vec::new());
        }

        let child_count = fnames.len().min(self.max_workers.max(1));
        let per_child = fnames.len().div_ceil(child_count);

        let mut partitions = Vec::with_capacity(child_count);
        let mut next_fid = 1u32;
        for chunk in fnames.chunks(per_child) {
            let mut files = Vec::with_capacity(chunk.len());
            for path in chunk {
                files.push((next_fid, path.clone()));
                next_fid += 1;
            }
            partitions.push(files);
        }
        Ok(partitions)
    }

    /// Spawns the workers in waves of `round(children * resources_factor)`
    /// threads. Workers share nothing; a failing worker aborts the build.
    fn create_child_indexes(&self) -> Result<Vec<PathBuf>> {
        let partitions = self.compute_child_partitions()?;
        if partitions.is_empty() {
            return Ok(Vec::new());
        }
        let pool_size = ((partitions.len() as f64 * self.resources_factor).round() as usize)
            .clamp(1, partitions.len());
        println!("worker pool size: {pool_size}");

        let children: Vec<ChildIndexer> = partitions
            .into_iter()
            .enumerate()
            .map(|(i, files)| {
                let indexer_id = i as u32 + 1;
                ChildIndexer::new(
                    indexer_id,
                    files,
                    self.dirtmp.join(indexer_id.to_string()),
                    self.corpus_type,
                    self.max_trec_docs_in_memory,
                )
            })
            .collect();

        let mut produced = Vec::new();
        for wave in children.chunks(pool_size) {
            let results: Vec<Result<Vec<PathBuf>>> = thread::scope(|scope| {
                let handles: Vec<_> = wave
                    .iter()
                    .map(|child| scope.spawn(move || child.create_index()))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(IndexError::Usage("indexing worker panicked".to_string()))
                        })
                    })
                    .collect()
            });
            for result in results {
                produced.extend(result?);
            }
        }
        Ok(produced)
    }

    fn merge_child_indexes(&mut self, final_index: &Index) -> Result<()> {
        let child_count = self.child_indexes.len();
        let mut in_memory_budget =
            (child_count as f64 * self.resources_factor).round() as usize;
        println!(
            "merging {child_count} subindexes ({in_memory_budget}/{child_count} with chunks info in RAM)..."
        );

        for (i, child) in self.child_indexes.iter_mut().enumerate() {
            child.load(in_memory_budget > 0)?;
            in_memory_budget = in_memory_budget.saturating_sub(1);
            println!("subindex {}/{} loaded", i + 1, child_count);
        }

        self.merge_child_collections(final_index)?;
        self.merge_child_postings(final_index)
    }

    /// DocId ranges are disjoint by construction, so merging collections is a
    /// conflict-free union, written docId-ascending.
    fn merge_child_collections(&self, final_index: &Index) -> Result<()> {
        println!("merging collections...");
        let started = Instant::now();
        let mut merged: BTreeMap<u32, String> = BTreeMap::new();
        for child in &self.child_indexes {
            for (doc_id, doc_name) in child.get_collection() {
                merged.insert(*doc_id, doc_name.clone());
            }
        }
        write_collection(&final_index.collection_path, &merged)?;
        println!(
            "collection merge time: {:.2}s",
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Global term map: for every term, which children hold a posting for it.
    fn vocabulary_by_child_indexes(&self) -> BTreeMap<String, Vec<usize>> {
        let mut terms: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, child) in self.child_indexes.iter().enumerate() {
            for term in child.terms() {
                terms.entry(term.to_string()).or_default().push(i);
            }
        }
        terms
    }

    fn merge_child_postings(&self, final_index: &Index) -> Result<()> {
        println!("merging postings...");
        let terms = self.vocabulary_by_child_indexes();

        // One sequential reader per child: terms are merged in the same
        // sorted order the children wrote them, so each reader only ever
        // advances through its postings file.
        let mut pfiles = Vec::with_capacity(self.child_indexes.len());
        for child in &self.child_indexes {
            pfiles.push(IndexStreamReader::open(&child.postings_path)?);
        }

        let stats_dir = if self.doc_encode.is_multi() && self.freq_encode.is_multi() {
            Some(self.dirout.as_path())
        } else {
            None
        };
        let mut writer = PostingWriter::create(
            final_index,
            self.chunk_size,
            self.doc_encode.clone(),
            self.freq_encode.clone(),
            stats_dir,
        )?;

        let total_terms = terms.len();
        let mut merged_terms = 0usize;
        for (term, children) in &terms {
            merged_terms += 1;
            if merged_terms % 25_000 == 0 {
                println!("merged {merged_terms}/{total_terms}");
            }

            let mut merged: FxHashMap<u32, u32> = FxHashMap::default();
            for &child_id in children {
                let pointer = self.child_indexes[child_id]
                    .get_posting_pointer_by_term(term)?
                    .ok_or_else(|| {
                        IndexError::Corrupt(format!("term '{term}' vanished from subindex"))
                    })?;
                for c in &pointer.chunks_info {
                    // Children always write Variable-Byte on both fields;
                    // reading it directly skips the codec dispatch.
                    let docs = gaps::decode(&pfiles[child_id].read_vb(c.docs_size as usize)?);
                    let freqs = pfiles[child_id].read_vb(c.freqs_size as usize)?;
                    if docs.len() != freqs.len() {
                        return Err(IndexError::CodecMismatch {
                            expected: docs.len(),
                            decoded: freqs.len(),
                        });
                    }
                    // Overlapping TREC docIds accumulate their frequencies.
                    for (doc_id, freq) in docs.into_iter().zip(freqs) {
                        *merged.entry(doc_id).or_insert(0) += freq;
                    }
                }
            }
            writer.append_term(term, &merged)?;
        }
        println!("merged {total_terms}/{total_terms}");
        writer.finish()
    }

    fn write_status(&self, index: &Index, merge_seconds: f64) -> Result<()> {
        let mib = |path: &Path| -> f64 {
            std::fs::metadata(path)
                .map(|meta| meta.len() as f64 / 1024.0 / 1024.0)
                .unwrap_or(0.0)
        };
        let info = format!(
            ">> index merge time: {merge_seconds:.2}s\n\n>> file sizes:\n\
             Collection: {:.1} MiB\nChunks info: {:.1} MiB\n\
             Vocabulary: {:.1} MiB\nPostings: {:.1} MiB\n",
            mib(&index.collection_path),
            mib(&index.chunksinfo_path),
            mib(&index.vocabulary_path),
            mib(&index.postings_path),
        );
        println!("\n{info}");
        let other = self.dirout.join("other");
        std::fs::create_dir_all(&other)?;
        std::fs::write(other.join("status.txt"), info)?;
        Ok(())
    }
}
