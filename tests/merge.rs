use std::fs;
use std::path::{Path, PathBuf};

use linefreq::error::Error;
use linefreq::io::artifact::{write_all, ArtifactKind, ArtifactReader, Entry};
use linefreq::io::WorkDir;
use linefreq::normalize::NormalizeOptions;
use linefreq::processing::merge::{merge, merge_files, Manifest, MergeMode, MergeOptions};
use linefreq::processing::ShardPlan;

const SNAPSHOT: &str = "2019-04";

const RESIDENT: MergeOptions = MergeOptions {
    memory_budget: u64::MAX,
    fan_in: 16,
};

fn read(path: &Path) -> Vec<Entry> {
    ArtifactReader::open(path).unwrap().read_all().unwrap().1
}

/// Plan `ranges` single file ranges of `snapshot`, and write a partial for each range of `present`.
fn snapshot_partials(
    work: &WorkDir,
    snapshot: &str,
    ranges: usize,
    present: impl Iterator<Item = usize>,
) {
    let files = (0..ranges)
        .map(|i| PathBuf::from(format!("/corpus/{}/part_{:03}.jsonl", snapshot, i)))
        .collect();
    let plan = ShardPlan::new(snapshot, files, 1).unwrap();
    plan.save(&work.plan_path(snapshot)).unwrap();
    for range in present {
        let entries = vec![(1, 1), (range as u64 + 100, 1)];
        write_all(
            &work.partial_path(snapshot, range),
            ArtifactKind::Partial,
            snapshot,
            Some(range as u32),
            &entries,
            1,
        )
        .unwrap();
    }
}

#[test]
fn counts_are_summed() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.bin");
    let b = dir.path().join("b.bin");
    write_all(&a, ArtifactKind::Partial, "s", Some(0), &[(1, 2), (2, 1)], 3).unwrap();
    write_all(&b, ArtifactKind::Partial, "s", Some(1), &[(1, 1), (3, 5)], 5).unwrap();

    let dst = dir.path().join("table.bin");
    let stats = merge_files(&[a, b], &dst, "t", &dir.path().join("tmp"), &RESIDENT).unwrap();
    assert_eq!(stats.documents, 8);
    assert_eq!(stats.input_entries, 4);
    assert_eq!(stats.entries, 3);
    assert_eq!(read(&dst), vec![(1, 3), (2, 1), (3, 5)]);

    let reader = ArtifactReader::open(&dst).unwrap();
    assert_eq!(reader.info().kind, ArtifactKind::Table);
    assert_eq!(reader.info().range, None);
}

#[test]
fn table_bytes_do_not_depend_on_merge_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..9u32)
        .map(|r| {
            let path = dir.path().join(format!("p{}.bin", r));
            let entries: Vec<Entry> = (0..50u64)
                .filter(|k| k % (r as u64 + 2) != 0)
                .map(|k| (k * 7919, r + 1))
                .collect();
            write_all(&path, ArtifactKind::Partial, "s", Some(r), &entries, 100).unwrap();
            path
        })
        .collect();

    let reference = dir.path().join("reference.bin");
    merge_files(&paths, &reference, "t", &dir.path().join("tmp"), &RESIDENT).unwrap();
    let expected = fs::read(&reference).unwrap();

    let mut reversed = paths.clone();
    reversed.reverse();
    let mut rotated = paths.clone();
    rotated.rotate_left(4);

    for (idx, order) in [paths.clone(), reversed, rotated].iter().enumerate() {
        for fan_in in [2, 3, 16] {
            let dst = dir.path().join(format!("table_{}_{}.bin", idx, fan_in));
            let options = MergeOptions {
                memory_budget: 0,
                fan_in,
            };
            let stats = merge_files(order, &dst, "t", &dir.path().join("tmp"), &options).unwrap();
            assert_eq!(stats.mode, MergeMode::Tree);
            assert_eq!(fs::read(&dst).unwrap(), expected, "order {} fan in {}", idx, fan_in);
        }
    }
}

#[test]
fn missing_range_fails_without_table() {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path());
    snapshot_partials(&work, SNAPSHOT, 10, (0..10).filter(|r| *r != 3));

    let res = merge(&work, SNAPSHOT, &[SNAPSHOT.to_string()], &RESIDENT);
    match res {
        Err(Error::MissingShardArtifact { snapshot, range }) => {
            assert_eq!(snapshot, SNAPSHOT);
            assert_eq!(range, 3);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!work.table_path(SNAPSHOT).exists());
    assert!(!work.manifest_path(SNAPSHOT).exists());
}

#[test]
fn corrupt_partial_fails_without_table() {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path());
    snapshot_partials(&work, SNAPSHOT, 4, 0..4);
    let partial = work.partial_path(SNAPSHOT, 2);
    let bytes = fs::read(&partial).unwrap();

    // a truncated file is caught before merging
    fs::write(&partial, &bytes[..bytes.len() - 3]).unwrap();
    let res = merge(&work, SNAPSHOT, &[SNAPSHOT.to_string()], &RESIDENT);
    assert!(matches!(res, Err(Error::CorruptShardArtifact { .. })), "{:?}", res);
    assert!(!work.table_path(SNAPSHOT).exists());

    // a bad checksum is caught while merging
    let mut flipped = bytes;
    let last = flipped.len() - 1;
    flipped[last] ^= 0xff;
    fs::write(&partial, &flipped).unwrap();
    for options in [
        RESIDENT,
        MergeOptions {
            memory_budget: 0,
            fan_in: 2,
        },
    ] {
        let res = merge(&work, SNAPSHOT, &[SNAPSHOT.to_string()], &options);
        assert!(matches!(res, Err(Error::CorruptShardArtifact { .. })), "{:?}", res);
        assert!(!work.table_path(SNAPSHOT).exists());
    }
}

#[test]
fn partial_of_another_range_is_inconsistent() {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path());
    snapshot_partials(&work, SNAPSHOT, 3, 0..3);
    fs::copy(
        work.partial_path(SNAPSHOT, 0),
        work.partial_path(SNAPSHOT, 1),
    )
    .unwrap();

    let res = merge(&work, SNAPSHOT, &[SNAPSHOT.to_string()], &RESIDENT);
    assert!(matches!(res, Err(Error::MergeInconsistency(_))), "{:?}", res);
    assert!(!work.table_path(SNAPSHOT).exists());
}

#[test]
fn unexpected_files_are_inconsistent() {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path());
    snapshot_partials(&work, SNAPSHOT, 2, 0..2);
    fs::write(work.partials_dir(SNAPSHOT).join("notes.txt"), "").unwrap();

    let res = merge(&work, SNAPSHOT, &[SNAPSHOT.to_string()], &RESIDENT);
    assert!(matches!(res, Err(Error::MergeInconsistency(_))), "{:?}", res);
}

#[test]
fn manifest_describes_table() {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path());
    snapshot_partials(&work, SNAPSHOT, 5, 0..5);

    let stats = merge(&work, SNAPSHOT, &[SNAPSHOT.to_string()], &RESIDENT).unwrap();
    assert_eq!(stats.partials, 5);
    assert_eq!(stats.documents, 5);
    // key 1 is shared, every range has its own key
    assert_eq!(stats.entries, 6);
    assert_eq!(read(&work.table_path(SNAPSHOT))[0], (1, 5));

    let manifest: Manifest =
        serde_json::from_str(&fs::read_to_string(work.manifest_path(SNAPSHOT)).unwrap()).unwrap();
    assert_eq!(manifest.name, SNAPSHOT);
    assert_eq!(manifest.snapshots, vec![SNAPSHOT.to_string()]);
    assert_eq!(manifest.documents, 5);
    assert_eq!(manifest.entries, 6);
    assert_eq!(manifest.partials.len(), 5);
    for (range, partial) in manifest.partials.iter().enumerate() {
        assert_eq!(partial.range, range);
        assert_eq!(partial.sha256.len(), 64);
    }

    // the same snapshot twice would count its documents twice
    let res = merge(
        &work,
        "twice",
        &[SNAPSHOT.to_string(), SNAPSHOT.to_string()],
        &RESIDENT,
    );
    assert!(matches!(res, Err(Error::MergeInconsistency(_))));
}

#[test]
fn snapshots_merge_into_one_table() {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path());
    snapshot_partials(&work, SNAPSHOT, 3, 0..3);
    snapshot_partials(&work, "2020-10", 2, 0..2);
    let snapshots = vec![SNAPSHOT.to_string(), "2020-10".to_string()];

    let stats = merge(&work, "all", &snapshots, &RESIDENT).unwrap();
    assert_eq!(stats.partials, 5);
    assert_eq!(stats.documents, 5);
    // range keys 100 and 101 are in both snapshots
    assert_eq!(
        read(&work.table_path("all")),
        vec![(1, 5), (100, 2), (101, 2), (102, 1)]
    );

    let manifest = Manifest::load(&work.manifest_path("all")).unwrap();
    assert_eq!(manifest.snapshots, snapshots);
    assert_eq!(manifest.documents, 5);
    assert_eq!(manifest.normalize, NormalizeOptions::default());
    let ranges: Vec<(&str, usize)> = manifest
        .partials
        .iter()
        .map(|p| (p.snapshot.as_str(), p.range))
        .collect();
    assert_eq!(
        ranges,
        vec![
            (SNAPSHOT, 0),
            (SNAPSHOT, 1),
            (SNAPSHOT, 2),
            ("2020-10", 0),
            ("2020-10", 1)
        ]
    );
}

#[test]
fn snapshots_of_different_normalizations_do_not_merge() {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path());
    snapshot_partials(&work, SNAPSHOT, 2, 0..2);
    snapshot_partials(&work, "2020-10", 2, 0..2);
    let plan_path = work.plan_path("2020-10");
    let stripped = NormalizeOptions {
        ascii_punctuation: true,
        ..Default::default()
    };
    ShardPlan::load(&plan_path)
        .unwrap()
        .with_normalize(stripped)
        .save(&plan_path)
        .unwrap();

    let snapshots = vec![SNAPSHOT.to_string(), "2020-10".to_string()];
    let res = merge(&work, "all", &snapshots, &RESIDENT);
    assert!(matches!(res, Err(Error::MergeInconsistency(_))), "{:?}", res);
    assert!(!work.table_path("all").exists());

    // each one alone is fine
    merge(&work, "2020-10", &snapshots[1..], &RESIDENT).unwrap();
    let manifest = Manifest::load(&work.manifest_path("2020-10")).unwrap();
    assert!(manifest.normalize.ascii_punctuation);
}
