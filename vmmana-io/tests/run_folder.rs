#![cfg(feature = "hdf5")]
#![allow(clippy::cast_possible_truncation)]
use approx::assert_relative_eq;
use tempfile::tempdir;
use vmmana_algorithms::{activity_timeline, hit_rate, strip_edges};
use vmmana_core::{Cluster, Hit, Plane, Region, Selection};
use vmmana_io::{load_run, write_event_file, ArtifactWriter};

fn segment_hits(n: u32, plane: Plane) -> Vec<Hit> {
    (0..n)
        .map(|i| Hit::new(plane, 8, (i % 64) as u8, f64::from(i % 500), 300))
        .collect()
}

#[test]
fn test_run_folder_rates_normalized_by_file_count() {
    let dir = tempdir().unwrap();
    write_event_file(
        dir.path().join("run_001.h5"),
        &segment_hits(60, Plane::X),
        &[Cluster::new(300.0, 300.0, 100.0, 50.0)],
    )
    .unwrap();
    write_event_file(
        dir.path().join("run_000.h5"),
        &[segment_hits(40, Plane::X), segment_hits(25, Plane::Y)].concat(),
        &[Cluster::new(160.0, 300.0, 100.0, 50.0)],
    )
    .unwrap();

    let run = load_run(dir.path(), 25.0).unwrap();
    assert_eq!(run.segments.len(), 2);
    assert!(run.segments[0].path.ends_with("run_000.h5"));
    assert_relative_eq!(run.duration_s(), 50.0);

    // 100 plane-x hits over 50 s.
    let rate = hit_rate(&run.hits, Plane::X, &strip_edges(), run.duration_s()).unwrap();
    assert_relative_eq!(rate.total(), 2.0, epsilon = 1e-12);

    let timeline = activity_timeline(&run);
    assert_eq!(timeline[0].hits, 65);
    assert_eq!(timeline[1].hits, 60);
    assert_relative_eq!(timeline[1].elapsed_s, 50.0);

    let in_d = Selection::Region(Region::D).apply(&run.clusters);
    assert_eq!(in_d.len(), 1);

    let out = dir.path().join("rate_x.csv");
    ArtifactWriter::create(&out)
        .unwrap()
        .write_histogram(&rate, "rate")
        .unwrap();
    let content = std::fs::read_to_string(&out).unwrap();
    assert_eq!(content.lines().count(), 501);
}
