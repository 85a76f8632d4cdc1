use std::path::PathBuf;

use itertools::Itertools;
use vid_dup_engine::*;

//Bit patterns chosen so that A~B and B~C pass the 0.90 similarity
//threshold (4 differing bits, 60/64 per frame) while A~C does not
//(8 differing bits, 56/64 per frame).
const BITS_A: u64 = 0;
const BITS_B: u64 = 0x0f;
const BITS_C: u64 = 0xff;

fn fp(path: &str, bits: u64) -> VideoFingerprint {
    VideoFingerprint::constant(path, bits, 10, 60.0)
}

fn empty_ignore_list() -> (tempfile::TempDir, IgnoreListStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = IgnoreListStore::open(dir.path());
    (dir, store)
}

#[test]
fn test_transitive_matches_share_a_group() {
    let fingerprints = vec![fp("/vids/a", BITS_A), fp("/vids/b", BITS_B), fp("/vids/c", BITS_C)];
    let (_dir, ignore_list) = empty_ignore_list();

    //sanity-check the pairwise relationships the grouping relies on
    let options = MatchOptions::default();
    assert!(compare_fingerprints(&fingerprints[0], &fingerprints[1], &options).is_similar());
    assert!(compare_fingerprints(&fingerprints[1], &fingerprints[2], &options).is_similar());
    assert!(!compare_fingerprints(&fingerprints[0], &fingerprints[2], &options).is_similar());

    let groups = find_duplicate_groups(
        &fingerprints,
        &ignore_list,
        &options,
        |_| (),
        &CancellationToken::new(),
    );

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
    for path in ["/vids/a", "/vids/b", "/vids/c"] {
        assert!(groups[0].contains(path));
    }
}

#[test]
fn test_unrelated_files_stay_out_of_groups() {
    let fingerprints = vec![
        fp("/vids/a", BITS_A),
        fp("/vids/a_copy", BITS_A),
        fp("/vids/unrelated", u64::MAX),
    ];
    let (_dir, ignore_list) = empty_ignore_list();

    let groups = find_duplicate_groups(
        &fingerprints,
        &ignore_list,
        &MatchOptions::default(),
        |_| (),
        &CancellationToken::new(),
    );

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    assert!(!groups[0].contains("/vids/unrelated"));
}

#[test]
fn test_ignored_pairs_are_skipped() {
    let fingerprints = vec![fp("/vids/a", BITS_A), fp("/vids/b", BITS_B), fp("/vids/c", BITS_C)];
    let (_dir, ignore_list) = empty_ignore_list();

    //removing the A-B edge leaves only B~C; A joins no group
    ignore_list.add("/vids/a", "/vids/b", false);

    let groups = find_duplicate_groups(
        &fingerprints,
        &ignore_list,
        &MatchOptions::default(),
        |_| (),
        &CancellationToken::new(),
    );

    assert_eq!(groups.len(), 1);
    assert!(groups[0].contains("/vids/b"));
    assert!(groups[0].contains("/vids/c"));
    assert!(!groups[0].contains("/vids/a"));
}

#[test]
fn test_progress_covers_every_pair() {
    let fingerprints = (0..5)
        .map(|file_no| fp(&format!("/vids/{file_no}"), BITS_A))
        .collect::<Vec<_>>();
    let (_dir, ignore_list) = empty_ignore_list();

    let mut events = Vec::new();
    find_duplicate_groups(
        &fingerprints,
        &ignore_list,
        &MatchOptions::default(),
        |event| events.push(event),
        &CancellationToken::new(),
    );

    //5 files -> 10 unordered pairs
    let expected_pairs = fingerprints.iter().tuple_combinations::<(_, _)>().count();
    assert_eq!(expected_pairs, 10);
    assert_eq!(events.len(), 10);
    assert!(events.iter().all(|event| matches!(
        event,
        ProgressEvent::Comparing { total_pairs: 10, .. }
    )));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Comparing {
            pairs_compared: 10,
            total_pairs: 10
        })
    );
}

#[test]
fn test_cancellation_before_the_scan_returns_nothing() {
    let fingerprints = vec![fp("/vids/a", BITS_A), fp("/vids/a_copy", BITS_A)];
    let (_dir, ignore_list) = empty_ignore_list();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let groups = find_duplicate_groups(
        &fingerprints,
        &ignore_list,
        &MatchOptions::default(),
        |_| (),
        &cancel,
    );
    assert!(groups.is_empty());
}

#[test]
fn test_cancellation_mid_scan_returns_groups_seen_so_far() {
    //pair order is (a,b), (a,c), (b,c); cancelling after the first pair
    //means b~c is never compared
    let fingerprints = vec![fp("/vids/a", BITS_A), fp("/vids/b", BITS_B), fp("/vids/c", BITS_C)];
    let (_dir, ignore_list) = empty_ignore_list();

    let cancel = CancellationToken::new();
    let groups = find_duplicate_groups(
        &fingerprints,
        &ignore_list,
        &MatchOptions::default(),
        |event| {
            if let ProgressEvent::Comparing { pairs_compared: 1, .. } = event {
                cancel.cancel();
            }
        },
        &cancel,
    );

    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].members().collect::<Vec<_>>(),
        vec![PathBuf::from("/vids/a"), PathBuf::from("/vids/b")]
    );
}

#[test]
fn test_groups_are_ordered_by_smallest_member() {
    let fingerprints = vec![
        fp("/vids/z1", BITS_A),
        fp("/vids/z2", BITS_A),
        fp("/vids/a1", u64::MAX),
        fp("/vids/a2", u64::MAX),
    ];
    let (_dir, ignore_list) = empty_ignore_list();

    let groups = find_duplicate_groups(
        &fingerprints,
        &ignore_list,
        &MatchOptions::default(),
        |_| (),
        &CancellationToken::new(),
    );

    assert_eq!(groups.len(), 2);
    assert!(groups[0].contains("/vids/a1"));
    assert!(groups[1].contains("/vids/z1"));
}
