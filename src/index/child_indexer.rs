use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::compression::EncodeType;
use crate::error::{IndexError, Result};
use crate::index::index::Index;
use crate::index::indexer::{write_collection, CorpusType};
use crate::index::posting_writer::{EncodeChoice, PostingWriter};
use crate::index::tokenizer;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

type TermMap = FxHashMap<String, FxHashMap<u32, u32>>;
type DocMap = FxHashMap<u32, String>;

/// One SPIMI worker: inverts its assigned files in memory and flushes the
/// result as a subindex. The coordinator pre-allocates this worker's docId
/// range, so ids are globally unique without any cross-worker coordination.
/// Subindexes are written chunkless with Variable-Byte on both fields: child
/// writes optimise for speed, the merger re-encodes with the final codecs.
pub struct ChildIndexer {
    indexer_id: u32,
    files: Vec<(u32, PathBuf)>,
    dirout: PathBuf,
    corpus_type: CorpusType,
    max_trec_docs_in_memory: usize,
}

impl ChildIndexer {
    pub fn new(
        indexer_id: u32,
        files: Vec<(u32, PathBuf)>,
        dirout: PathBuf,
        corpus_type: CorpusType,
        max_trec_docs_in_memory: usize,
    ) -> Self {
        Self {
            indexer_id,
            files,
            dirout,
            corpus_type,
            max_trec_docs_in_memory,
        }
    }

    /// Runs the worker to completion. Returns the subindex directories it
    /// produced (TREC feeds can spill into several).
    pub fn create_index(&self) -> Result<Vec<PathBuf>> {
        match self.corpus_type {
            CorpusType::Trec => self.process_trec_corpus(),
            CorpusType::Text | CorpusType::Html => self.process_file_corpus(),
        }
    }

    fn check_term(terms: &mut TermMap, doc_id: u32, token: &str) {
        if token.is_empty() {
            return;
        }
        if let Some(term) = tokenizer::normalize(token) {
            *terms.entry(term).or_default().entry(doc_id).or_insert(0) += 1;
        }
    }

    fn print_progress(&self, started: &mut Instant, processed: u64, total: Option<u64>) {
        let elapsed = started.elapsed().as_secs_f64();
        match total {
            Some(total) => println!(
                "indexer {}: {}/{} docs processed ({:.2}s)",
                self.indexer_id, processed, total, elapsed
            ),
            None => println!(
                "indexer {}: {}/? docs processed ({:.2}s)",
                self.indexer_id, processed, elapsed
            ),
        }
        *started = Instant::now();
    }

    /// Text and HTML corpora: one document per input file, docIds taken from
    /// the pre-partitioned allocation.
    fn process_file_corpus(&self) -> Result<Vec<PathBuf>> {
        let mut docs: DocMap = FxHashMap::default();
        let mut terms: TermMap = TermMap::default();

        let mut started = Instant::now();
        let total = self.files.len() as u64;
        let mut processed = 0u64;

        for (doc_id, path) in &self.files {
            if processed % 5000 == 0 {
                self.print_progress(&mut started, processed, Some(total));
            }
            let doc_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| doc_id.to_string());
            docs.insert(*doc_id, doc_name);

            let file = File::open(path)?;
            for line in BufReader::new(file).lines() {
                let mut line = line?;
                if self.corpus_type == CorpusType::Html {
                    line = HTML_TAG.replace_all(&line, "").into_owned();
                }
                for token in line.split_whitespace() {
                    Self::check_term(&mut terms, *doc_id, token);
                }
            }
            processed += 1;
        }
        self.print_progress(&mut started, processed, Some(total));

        let dir = self.save(&docs, &terms, &self.dirout)?;
        self.write_indexation_info(&self.dirout)?;
        Ok(vec![dir])
    }

    /// TREC corpora: a small state machine over <DOC>, <DOCNO>...</DOCNO>
    /// and </DOC> markers. DocIds come from the feed itself, and the in-memory
    /// maps are flushed as numbered subindexes under memory pressure.
    fn process_trec_corpus(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut docs: DocMap = FxHashMap::default();
        let mut terms: TermMap = TermMap::default();

        let mut started = Instant::now();
        let mut doc_id = 0u32;
        let mut is_start_doc = false;
        let mut docs_processed = 0u64;
        let mut subindex_id = 1u32;

        for (_, path) in &self.files {
            let file = File::open(path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;

                if is_start_doc {
                    // DOCNO lines carry the feed's own document id. Repeated
                    // DOCNOs keep their first registration.
                    let stripped = HTML_TAG.replace_all(&line, "");
                    doc_id = stripped.trim().parse().map_err(|_| {
                        IndexError::Corrupt(format!("bad DOCNO line: {line}"))
                    })?;
                    is_start_doc = false;
                    docs.entry(doc_id).or_insert_with(|| doc_id.to_string());
                    continue;
                } else if line == "<DOC>" {
                    is_start_doc = true;
                    continue;
                } else if line == "</DOC>" {
                    docs_processed += 1;
                    if docs_processed % 50_000 == 0 {
                        self.print_progress(&mut started, docs_processed, None);
                    }
                    if docs.len() >= self.max_trec_docs_in_memory {
                        dirs.push(self.flush_subindex(&docs, &terms, subindex_id)?);
                        subindex_id += 1;
                        docs.clear();
                        terms.clear();
                    }
                    continue;
                }

                for token in line.split_whitespace() {
                    Self::check_term(&mut terms, doc_id, token);
                }
            }
        }
        self.print_progress(&mut started, docs_processed, Some(docs_processed));

        if !docs.is_empty() || !terms.is_empty() {
            dirs.push(self.flush_subindex(&docs, &terms, subindex_id)?);
        }
        Ok(dirs)
    }

    fn flush_subindex(&self, docs: &DocMap, terms: &TermMap, subindex_id: u32) -> Result<PathBuf> {
        println!(
            "indexer {}: dumping {} docs, {} terms...",
            self.indexer_id,
            docs.len(),
            terms.len()
        );
        let mut dirout = self.dirout.as_os_str().to_os_string();
        dirout.push(format!("-{subindex_id}"));
        let dirout = PathBuf::from(dirout);
        let dir = self.save(docs, terms, &dirout)?;
        self.write_indexation_info(&dirout)?;
        Ok(dir)
    }

    fn save(&self, docs: &DocMap, terms: &TermMap, dirout: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dirout)?;
        let index = Index::new(dirout);

        let sorted_docs: std::collections::BTreeMap<u32, String> =
            docs.iter().map(|(id, name)| (*id, name.clone())).collect();
        write_collection(&index.collection_path, &sorted_docs)?;

        let mut writer = PostingWriter::create(
            &index,
            0,
            EncodeChoice::Mono(EncodeType::VariableByte),
            EncodeChoice::Mono(EncodeType::VariableByte),
            None,
        )?;
        let mut sorted_terms: Vec<&String> = terms.keys().collect();
        sorted_terms.sort();
        for term in sorted_terms {
            writer.append_term(term, &terms[term])?;
        }
        writer.finish()?;
        Ok(dirout.to_path_buf())
    }

    fn write_indexation_info(&self, dirout: &Path) -> Result<()> {
        let other = dirout.join("other");
        std::fs::create_dir_all(&other)?;
        std::fs::write(other.join("status.txt"), "subindex build completed\n")?;
        Ok(())
    }
}
