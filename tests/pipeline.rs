use std::fs;
use std::path::Path;

use linefreq::config::{ByteSize, Config};
use linefreq::filtering::FilterPolicy;
use linefreq::io::reader::{CountInfoReader, JsonlReader};
use linefreq::io::WorkDir;
use linefreq::normalize::NormalizeOptions;
use linefreq::pipelines::{
    sweep_grid, AnnotatePipeline, ExtractPipeline, HashPipeline, MergePipeline, Pipeline,
};
use linefreq::processing::ShardPlan;
use linefreq::types::{CountInfoDocument, FilteredDocument};
use serde_json::json;

const SNAPSHOT: &str = "2019-04";

fn config() -> Config {
    Config {
        files_per_range: 1,
        ..Default::default()
    }
}

/// Write one corpus file per document list.
fn write_corpus(src: &Path, snapshot: &str, files: &[Vec<(&str, Vec<&str>)>]) {
    let dir = src.join(snapshot);
    fs::create_dir_all(&dir).unwrap();
    for (idx, docs) in files.iter().enumerate() {
        let content: String = docs
            .iter()
            .map(|(id, lines)| {
                let doc = json!({"id": id, "language": "en", "text": lines.join("\n")});
                format!("{}\n", doc)
            })
            .collect();
        fs::write(dir.join(format!("part_{:03}.jsonl", idx)), content).unwrap();
    }
}

fn subscribe_corpus(src: &Path) {
    write_corpus(
        src,
        SNAPSHOT,
        &[
            vec![
                (
                    "doc-1",
                    vec!["Click here to subscribe", "The first document is about cats."],
                ),
                (
                    "doc-2",
                    vec!["Dogs are discussed in this one.", "Click here to subscribe"],
                ),
            ],
            vec![(
                "doc-3",
                vec!["Click here to subscribe", "Birds, finally."],
            )],
        ],
    );
}

fn build_count_info(src: &Path, work: &WorkDir, config: &Config) {
    let snapshots = vec![SNAPSHOT.to_string()];
    HashPipeline::new(
        src.to_path_buf(),
        work.clone(),
        snapshots.clone(),
        config.clone(),
    )
    .run()
    .unwrap();
    MergePipeline::new(work.clone(), SNAPSHOT.to_string(), snapshots.clone(), config)
        .run()
        .unwrap();
    AnnotatePipeline::new(work.clone(), SNAPSHOT.to_string(), snapshots, config.clone())
        .run()
        .unwrap();
}

fn read_count_info(work: &WorkDir) -> Vec<CountInfoDocument> {
    let plan = ShardPlan::load(&work.plan_path(SNAPSHOT)).unwrap();
    (0..plan.files.len())
        .flat_map(|idx| {
            CountInfoReader::from_path(&work.count_info_path(SNAPSHOT, SNAPSHOT, idx))
                .unwrap()
                .map(|d| d.unwrap())
                .collect::<Vec<_>>()
        })
        .collect()
}

fn read_extracted(work: &WorkDir, policy: &str) -> Vec<FilteredDocument> {
    let dir = work.extracted_dir(policy, SNAPSHOT).join(SNAPSHOT);
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
        .iter()
        .flat_map(|f| {
            JsonlReader::<FilteredDocument, _>::from_path(f)
                .unwrap()
                .map(|d| d.unwrap())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn click_here_to_subscribe() {
    let src = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let work = WorkDir::new(work.path());
    subscribe_corpus(src.path());
    build_count_info(src.path(), &work, &config());

    let docs = read_count_info(&work);
    assert_eq!(docs.len(), 3);
    for doc in &docs {
        for record in doc.records() {
            let expected = if record.text == "Click here to subscribe" {
                3
            } else {
                1
            };
            assert_eq!(record.count, expected, "{:?}", record);
        }
    }

    let policies: Vec<FilterPolicy> = ["ptf:1", "ptf:3"]
        .iter()
        .map(|p| p.parse().unwrap())
        .collect();
    let stats = ExtractPipeline::new(
        work.clone(),
        SNAPSHOT.to_string(),
        sweep_grid(&policies, &[]),
    )
    .unwrap()
    .run()
    .unwrap();
    assert_eq!(stats.len(), 2);

    let strict = read_extracted(&work, "ptf-k1");
    assert_eq!(strict.len(), 3);
    for doc in &strict {
        assert!(!doc.text.contains("Click here to subscribe"));
        assert_eq!(doc.text.lines().count(), 1);
    }
    assert_eq!(strict[0].text, "The first document is about cats.");

    let loose = read_extracted(&work, "ptf-k3");
    assert!(loose
        .iter()
        .all(|doc| doc.text.contains("Click here to subscribe")));
    assert_eq!(
        loose[1].text,
        "Dogs are discussed in this one.\nClick here to subscribe"
    );

    assert_eq!(stats[0].dropped_lines, 3);
    assert_eq!(stats[1].dropped_lines, 0);
    assert!(work.stats_path("ptf-k1", SNAPSHOT).exists());
}

#[test]
fn counts_documents_not_occurrences() {
    let src = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let work = WorkDir::new(work.path());
    write_corpus(
        src.path(),
        SNAPSHOT,
        &[
            vec![("a", vec!["menu", "menu", "MENU ", "text a"])],
            vec![("b", vec!["menu", "text b"]), ("c", vec!["other"])],
        ],
    );
    build_count_info(src.path(), &work, &config());

    let docs = read_count_info(&work);
    assert_eq!(docs[0].counts, vec![2, 2, 2, 1]);
    assert_eq!(docs[1].counts, vec![2, 1]);
    assert_eq!(docs[2].counts, vec![1]);
}

#[test]
fn annotation_is_idempotent_and_independent_of_table_residency() {
    let src = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let work = WorkDir::new(work.path());
    subscribe_corpus(src.path());
    build_count_info(src.path(), &work, &config());

    let path = work.count_info_path(SNAPSHOT, SNAPSHOT, 0);
    let first = fs::read(&path).unwrap();

    // a streamed table, in small batches
    let streaming = Config {
        memory_budget: ByteSize(0),
        batch_size: 1,
        ..config()
    };
    AnnotatePipeline::new(
        work.clone(),
        SNAPSHOT.to_string(),
        vec![SNAPSHOT.to_string()],
        streaming,
    )
    .force(true)
    .run()
    .unwrap();
    assert_eq!(fs::read(&path).unwrap(), first);

    // existing files are not annotated again
    let stats = AnnotatePipeline::new(
        work.clone(),
        SNAPSHOT.to_string(),
        vec![SNAPSHOT.to_string()],
        config(),
    )
    .run()
    .unwrap();
    assert_eq!(stats.skipped_files, 2);
    assert_eq!(stats.documents, 0);
}

#[test]
fn hashing_resumes_missing_ranges() {
    let src = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let work = WorkDir::new(work.path());
    let files: Vec<Vec<(&str, Vec<&str>)>> =
        (0..4).map(|_| vec![("d", vec!["line"])]).collect();
    write_corpus(src.path(), SNAPSHOT, &files);

    let snapshots = vec![SNAPSHOT.to_string()];
    HashPipeline::new(
        src.path().to_path_buf(),
        work.clone(),
        snapshots.clone(),
        config(),
    )
    .ranges(Some(1..3))
    .run()
    .unwrap();
    let plan = ShardPlan::load(&work.plan_path(SNAPSHOT)).unwrap();
    assert_eq!(plan.missing_ranges(&work), vec![0, 3]);

    let stats = HashPipeline::new(src.path().to_path_buf(), work.clone(), snapshots, config())
        .run()
        .unwrap();
    assert_eq!(stats.ranges, 2);
    assert_eq!(stats.skipped_ranges, 2);
    assert!(plan.missing_ranges(&work).is_empty());
}

#[test]
fn sweep_writes_summary() {
    let src = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let work = WorkDir::new(work.path());
    subscribe_corpus(src.path());
    build_count_info(src.path(), &work, &config());

    let policies: Vec<FilterPolicy> = ["pld:2,3,3:banded", "pld:2,3,3"]
        .iter()
        .map(|p| p.parse().unwrap())
        .collect();
    let stats = ExtractPipeline::new(
        work.clone(),
        SNAPSHOT.to_string(),
        sweep_grid(&policies, &[1]),
    )
    .unwrap()
    .run()
    .unwrap();
    assert_eq!(stats.len(), 4);
    // 3 lines of count 3 are boilerplate
    assert!(stats.iter().all(|s| s.boilerplate_lines == 3));
    assert_eq!(stats[0].kept_lines, 3);

    let csv = fs::read_to_string(work.sweep_path(SNAPSHOT)).unwrap();
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows.len(), 5);
    assert!(rows[0].starts_with("extraction,"));
    assert!(rows[1].starts_with("pld-r2-y3-g3-banded,"));
}

#[test]
fn annotation_uses_the_normalization_of_the_table() {
    let src = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let work = WorkDir::new(work.path());
    write_corpus(
        src.path(),
        SNAPSHOT,
        &[vec![("a", vec!["Hello, world!"]), ("b", vec!["Hello world"])]],
    );
    let stripped = Config {
        normalize: NormalizeOptions {
            ascii_punctuation: true,
            ..Default::default()
        },
        ..config()
    };
    let snapshots = vec![SNAPSHOT.to_string()];
    HashPipeline::new(
        src.path().to_path_buf(),
        work.clone(),
        snapshots.clone(),
        stripped.clone(),
    )
    .run()
    .unwrap();
    MergePipeline::new(work.clone(), SNAPSHOT.to_string(), snapshots.clone(), &stripped)
        .run()
        .unwrap();

    // hashing again with another normalization would mix keys
    let res = HashPipeline::new(
        src.path().to_path_buf(),
        work.clone(),
        snapshots.clone(),
        config(),
    )
    .force(true)
    .run();
    assert!(res.is_err());

    let res = AnnotatePipeline::new(
        work.clone(),
        SNAPSHOT.to_string(),
        snapshots.clone(),
        config(),
    )
    .run();
    assert!(res.is_err());
    assert!(!work.count_info_path(SNAPSHOT, SNAPSHOT, 0).exists());

    AnnotatePipeline::new(work.clone(), SNAPSHOT.to_string(), snapshots, stripped)
        .run()
        .unwrap();
    let docs = read_count_info(&work);
    assert_eq!(docs[0].counts, vec![2]);
    assert_eq!(docs[1].counts, vec![2]);
}

#[test]
fn count_info_follows_the_table() {
    let src = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let work = WorkDir::new(work.path());
    write_corpus(src.path(), SNAPSHOT, &[vec![("a", vec!["menu", "text a"])]]);
    build_count_info(src.path(), &work, &config());
    assert_eq!(read_count_info(&work)[0].counts, vec![1, 1]);
    assert!(work.count_info_stamp_path(SNAPSHOT).exists());

    // the same corpus file, with one more document
    write_corpus(
        src.path(),
        SNAPSHOT,
        &[vec![("a", vec!["menu", "text a"]), ("b", vec!["menu"])]],
    );
    let snapshots = vec![SNAPSHOT.to_string()];
    HashPipeline::new(
        src.path().to_path_buf(),
        work.clone(),
        snapshots.clone(),
        config(),
    )
    .force(true)
    .run()
    .unwrap();
    MergePipeline::new(work.clone(), SNAPSHOT.to_string(), snapshots.clone(), &config())
        .run()
        .unwrap();

    let stats = AnnotatePipeline::new(work.clone(), SNAPSHOT.to_string(), snapshots, config())
        .run()
        .unwrap();
    assert_eq!(stats.skipped_files, 0);
    assert_eq!(stats.documents, 2);
    let docs = read_count_info(&work);
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].counts, vec![2, 1]);
    assert_eq!(docs[1].counts, vec![2]);
}
