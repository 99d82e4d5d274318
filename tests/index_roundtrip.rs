use std::path::Path;

use rustc_hash::FxHashMap;
use tempfile::TempDir;

use irindex::browser::{BrowseType, Browser};
use irindex::compression::{elias_fano, EncodeType};
use irindex::index::index::Index;
use irindex::index::indexer::{CorpusType, Indexer, IndexerStatus};
use irindex::index::posting_writer::EncodeChoice;

fn write_files(dir: &Path, docs: &[(&str, &str)]) {
    for (name, content) in docs {
        std::fs::write(dir.join(name), content).unwrap();
    }
}

fn build(
    corpus: &Path,
    out: &Path,
    corpus_type: CorpusType,
    chunk_size: u32,
    doc_encode: EncodeChoice,
    freq_encode: EncodeChoice,
    max_workers: Option<usize>,
) -> Index {
    let mut indexer = Indexer::new(corpus, corpus_type, false);
    indexer.doc_encode = doc_encode;
    indexer.freq_encode = freq_encode;
    if let Some(max_workers) = max_workers {
        indexer.max_workers = max_workers;
    }
    let (mut index, status) = indexer.create_index(out, true, chunk_size).unwrap();
    assert_eq!(status, IndexerStatus::Ok);
    index.load(false).unwrap();
    index
}

fn posting(pairs: &[(u32, u32)]) -> FxHashMap<u32, u32> {
    pairs.iter().copied().collect()
}

fn mono(etype: EncodeType) -> EncodeChoice {
    EncodeChoice::Mono(etype)
}

#[test]
fn test_tiny_text_corpus() {
    let corpus = TempDir::new().unwrap();
    write_files(
        corpus.path(),
        &[
            ("d1.txt", "the red fox\n"),
            ("d2.txt", "red car\n"),
            ("d3.txt", "the fox runs\n"),
        ],
    );
    let out = TempDir::new().unwrap();
    let index = build(
        corpus.path(),
        &out.path().join("index"),
        CorpusType::Text,
        2,
        mono(EncodeType::VariableByte),
        mono(EncodeType::VariableByte),
        None,
    );

    let mut browser = Browser::new(&index, BrowseType::Boolean);
    assert_eq!(browser.browse("red fox").unwrap(), vec![1]);
    assert_eq!(browser.browse("red").unwrap(), vec![1, 2]);
    assert_eq!(browser.browse("runs").unwrap(), vec![3]);
    // The tokenizer dropped "the" at build time.
    assert_eq!(browser.browse("the").unwrap(), Vec::<u32>::new());
    assert_eq!(browser.browse("").unwrap(), Vec::<u32>::new());
    assert!(browser.get_benchmark().is_some());
}

#[test]
fn test_chunk_boundary() {
    // Term "fox" in docIds 1..=5 with C = 2: three chunks of sizes [2, 2, 1].
    let corpus = TempDir::new().unwrap();
    write_files(
        corpus.path(),
        &[
            ("d1.txt", "fox\n"),
            ("d2.txt", "fox\n"),
            ("d3.txt", "fox\n"),
            ("d4.txt", "fox\n"),
            ("d5.txt", "fox\n"),
        ],
    );
    let out = TempDir::new().unwrap();
    let index = build(
        corpus.path(),
        &out.path().join("index"),
        CorpusType::Text,
        2,
        mono(EncodeType::VariableByte),
        mono(EncodeType::VariableByte),
        None,
    );

    let pointer = index.get_posting_pointer_by_term("fox").unwrap().unwrap();
    assert_eq!(pointer.posting_count, 5);
    let sizes: Vec<u32> = pointer.chunks_info.iter().map(|c| c.chunk_size).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    // On disk the count field holds posting_count - 1 = 4, directly after
    // the 5-byte header and the VB posting start of the sole term.
    let bytes = std::fs::read(&index.chunksinfo_path).unwrap();
    assert_eq!(bytes[5], 0x00);
    assert_eq!(bytes[6], 0x04);

    assert_eq!(
        index.get_posting_by_term("fox").unwrap(),
        posting(&[(1, 1), (2, 1), (3, 1), (4, 1), (5, 1)])
    );
}

#[test]
fn test_elias_fano_stores_raw_doc_ids() {
    // TREC framing drives docIds from the feed: 10, 11, 12, 13, 100.
    let corpus = TempDir::new().unwrap();
    let mut feed = String::new();
    for doc_id in [10u32, 11, 12, 13, 100] {
        feed.push_str(&format!("<DOC>\n<DOCNO>{doc_id}</DOCNO>\nfox\n</DOC>\n"));
    }
    write_files(corpus.path(), &[("feed.trec", &feed)]);
    let out = TempDir::new().unwrap();
    let index = build(
        corpus.path(),
        &out.path().join("index"),
        CorpusType::Trec,
        0,
        mono(EncodeType::EliasFano),
        mono(EncodeType::VariableByte),
        None,
    );

    assert_eq!(
        index.get_posting_by_term("fox").unwrap(),
        posting(&[(10, 1), (11, 1), (12, 1), (13, 1), (100, 1)])
    );

    // The docs blob must hold the Elias-Fano encoding of the RAW values:
    // no gap transform was applied.
    let (expected, _) = elias_fano::encode(&[10, 11, 12, 13, 100]);
    let postings = std::fs::read(&index.postings_path).unwrap();
    assert_eq!(&postings[..expected.len()], &expected[..]);
}

#[test]
fn test_pfd_threshold_falls_back_to_variable_byte() {
    // 40 docIds stay below the PForDelta block threshold: the docs blob is
    // written (and read back) as Variable-Byte.
    let corpus = TempDir::new().unwrap();
    let mut feed = String::new();
    for doc_id in 1..=40u32 {
        feed.push_str(&format!("<DOC>\n<DOCNO>{doc_id}</DOCNO>\nfox\n</DOC>\n"));
    }
    write_files(corpus.path(), &[("feed.trec", &feed)]);
    let out = TempDir::new().unwrap();
    let index = build(
        corpus.path(),
        &out.path().join("index"),
        CorpusType::Trec,
        0,
        mono(EncodeType::PForDelta),
        mono(EncodeType::VariableByte),
        None,
    );

    let pointer = index.get_posting_pointer_by_term("fox").unwrap().unwrap();
    assert_eq!(pointer.posting_count, 40);
    assert_eq!(pointer.chunks_info[0].docs_encode, EncodeType::PForDelta);
    // Gap-transformed docIds 1..=40 are all 1: forty single VB bytes, not
    // PFD words.
    assert_eq!(pointer.chunks_info[0].docs_size, 40);
    let postings = std::fs::read(&index.postings_path).unwrap();
    assert_eq!(&postings[..40], &[0x01; 40]);

    let expected: Vec<(u32, u32)> = (1..=40).map(|doc_id| (doc_id, 1)).collect();
    assert_eq!(index.get_posting_by_term("fox").unwrap(), posting(&expected));
}

#[test]
fn test_multiencode_tie_break_on_single_element_postings() {
    // Single-element sequences encode identically under VariableByte and
    // Elias-Fano; the recorded per-chunk codec must be VariableByte.
    let corpus = TempDir::new().unwrap();
    write_files(corpus.path(), &[("d1.txt", "fox fox fox\n")]);
    let out = TempDir::new().unwrap();
    let index = build(
        corpus.path(),
        &out.path().join("index"),
        CorpusType::Text,
        0,
        EncodeChoice::Multi(vec![EncodeType::VariableByte, EncodeType::EliasFano]),
        mono(EncodeType::VariableByte),
        None,
    );
    assert!(index.is_multiencode());

    let pointer = index.get_posting_pointer_by_term("fox").unwrap().unwrap();
    assert_eq!(pointer.chunks_info.len(), 1);
    assert_eq!(
        pointer.chunks_info[0].docs_encode,
        EncodeType::VariableByte
    );
    assert_eq!(index.get_posting_by_term("fox").unwrap(), posting(&[(1, 3)]));
}

#[test]
fn test_two_worker_merge() {
    // Eight files over two workers: docIds 1..=4 on worker A, 5..=8 on
    // worker B. "fox" appears in docs 2, 5 and 7 with frequencies 3, 1, 4.
    let corpus = TempDir::new().unwrap();
    write_files(
        corpus.path(),
        &[
            ("d1.txt", "lion\n"),
            ("d2.txt", "fox fox fox\n"),
            ("d3.txt", "wolf\n"),
            ("d4.txt", "bear\n"),
            ("d5.txt", "fox deer\n"),
            ("d6.txt", "hawk\n"),
            ("d7.txt", "fox fox fox fox\n"),
            ("d8.txt", "lion wolf\n"),
        ],
    );
    let out = TempDir::new().unwrap();
    let index = build(
        corpus.path(),
        &out.path().join("index"),
        CorpusType::Text,
        2,
        mono(EncodeType::VariableByte),
        mono(EncodeType::VariableByte),
        Some(2),
    );

    assert_eq!(
        index.get_posting_by_term("fox").unwrap(),
        posting(&[(2, 3), (5, 1), (7, 4)])
    );

    // Chunked at C = 2: [(2, 5), (7)], stored in docId-gap form [(2, 3), (7)].
    let pointer = index.get_posting_pointer_by_term("fox").unwrap().unwrap();
    let sizes: Vec<u32> = pointer.chunks_info.iter().map(|c| c.chunk_size).collect();
    assert_eq!(sizes, vec![2, 1]);

    let postings = std::fs::read(&index.postings_path).unwrap();
    let at = pointer.posting_start as usize;
    // docs chunk 1: VB gaps [2, 3]; freqs chunk 1: [3, 1];
    // docs chunk 2: VB [7]; freqs chunk 2: [4].
    assert_eq!(&postings[at..at + 6], &[0x02, 0x03, 0x03, 0x01, 0x07, 0x04]);

    // Cross-worker terms keep working.
    let mut browser = Browser::new(&index, BrowseType::Boolean);
    assert_eq!(browser.browse("lion").unwrap(), vec![1, 8]);
    assert_eq!(browser.browse("lion wolf").unwrap(), vec![8]);
    assert_eq!(browser.browse("fox hawk").unwrap(), Vec::<u32>::new());
}

#[test]
fn test_mono_and_multi_encodes_are_semantically_identical() {
    let corpus = TempDir::new().unwrap();
    // A corpus with skewed frequencies and posting lengths.
    let mut docs = Vec::new();
    for i in 1..=30u32 {
        let mut content = String::new();
        content.push_str(&"fox ".repeat((i % 5 + 1) as usize));
        if i % 2 == 0 {
            content.push_str(&"wolf ".repeat((i % 3 + 1) as usize));
        }
        if i % 3 == 0 {
            content.push_str("lion ");
        }
        if i % 7 == 0 {
            content.push_str("rare ");
        }
        content.push('\n');
        docs.push((format!("d{i:02}.txt"), content));
    }
    let named: Vec<(&str, &str)> = docs
        .iter()
        .map(|(name, content)| (name.as_str(), content.as_str()))
        .collect();
    write_files(corpus.path(), &named);

    let configs: Vec<(u32, EncodeChoice, EncodeChoice)> = vec![
        (0, mono(EncodeType::VariableByte), mono(EncodeType::VariableByte)),
        (2, mono(EncodeType::Gamma), mono(EncodeType::Unary)),
        (7, mono(EncodeType::BitPacking), mono(EncodeType::Gamma)),
        (4, mono(EncodeType::EliasFano), mono(EncodeType::VariableByte)),
        (3, mono(EncodeType::Simple16), mono(EncodeType::Simple16)),
        (0, mono(EncodeType::PForDelta), mono(EncodeType::VariableByte)),
        (
            5,
            EncodeChoice::Multi(vec![
                EncodeType::VariableByte,
                EncodeType::Unary,
                EncodeType::Gamma,
                EncodeType::BitPacking,
                EncodeType::Simple16,
                EncodeType::PForDelta,
                EncodeType::EliasFano,
            ]),
            EncodeChoice::Multi(vec![
                EncodeType::VariableByte,
                EncodeType::Unary,
                EncodeType::Gamma,
            ]),
        ),
    ];

    let out = TempDir::new().unwrap();
    let reference = build(
        corpus.path(),
        &out.path().join("reference"),
        CorpusType::Text,
        0,
        mono(EncodeType::VariableByte),
        mono(EncodeType::VariableByte),
        None,
    );
    let terms = ["fox", "wolf", "lion", "rare", "absent"];

    for (i, (chunk_size, doc_encode, freq_encode)) in configs.into_iter().enumerate() {
        let index = build(
            corpus.path(),
            &out.path().join(format!("variant-{i}")),
            CorpusType::Text,
            chunk_size,
            doc_encode,
            freq_encode,
            None,
        );
        for term in terms {
            assert_eq!(
                index.get_posting_by_term(term).unwrap(),
                reference.get_posting_by_term(term).unwrap(),
                "posting mismatch for '{term}' in variant {i}"
            );
        }
        let mut browser = Browser::new(&index, BrowseType::Boolean);
        let mut reference_browser = Browser::new(&reference, BrowseType::Boolean);
        for query in ["fox wolf", "fox lion rare", "wolf rare", "fox"] {
            assert_eq!(
                browser.browse(query).unwrap(),
                reference_browser.browse(query).unwrap(),
                "browse mismatch for '{query}' in variant {i}"
            );
        }
    }
}

#[test]
fn test_chunks_info_in_memory_load_is_equivalent() {
    let corpus = TempDir::new().unwrap();
    write_files(
        corpus.path(),
        &[
            ("d1.txt", "fox wolf\n"),
            ("d2.txt", "fox fox wolf wolf wolf\n"),
            ("d3.txt", "fox lion\n"),
        ],
    );
    let out = TempDir::new().unwrap();
    let index_dir = out.path().join("index");
    let on_demand = build(
        corpus.path(),
        &index_dir,
        CorpusType::Text,
        2,
        mono(EncodeType::Gamma),
        mono(EncodeType::Unary),
        None,
    );
    assert_eq!(on_demand.chunks_info_in_memory_count(), 0);

    let mut eager = Index::new(&index_dir);
    eager.load(true).unwrap();
    assert!(eager.chunks_info_in_memory_count() > 0);

    for term in ["fox", "wolf", "lion"] {
        assert_eq!(
            eager.get_posting_by_term(term).unwrap(),
            on_demand.get_posting_by_term(term).unwrap()
        );
    }
}
