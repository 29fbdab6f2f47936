//! Concurrent axis dispatcher tests

use std::fs;
use std::path::Path;
use std::sync::Arc;

use fouracc_common::dispatch::{AxisError, DispatchError, Dispatcher, JobTarget, ProcessParams, RangeError, XAxis};
use fouracc_common::persist::{Artifacts, DirectorySink, PersistError, ResultSink};
use fouracc_common::plot::{PlotRenderer, RenderError};
use fouracc_common::recording::Recording;
use fouracc_common::spectrum::Spectrum;
use tempfile::TempDir;

const MSR: &str = "\
*CREATOR
MSR145;
*STARTTIME
2019-05-03;10:00:00;
*MODUL
MSR145;ACC;ACC;ACC;
*CHANNEL
TIME;ACC x;ACC y;ACC z;
*DATA
2019-05-03 10:00:00.00;1;0;5
2019-05-03 10:00:00.25;2;1;5
2019-05-03 10:00:00.50;3;0;5
2019-05-03 10:00:00.75;4;1;5
2019-05-03 10:00:01.00;5;0;5
2019-05-03 10:00:01.25;6;1;5
2019-05-03 10:00:01.50;7;0;5
2019-05-03 10:00:01.75;8;1;5
";

/// Renderer that skips rasterization
struct StubRenderer;

impl PlotRenderer for StubRenderer {
    fn render(&self, spectrum: &Spectrum) -> Result<Vec<u8>, RenderError> {
        Ok(spectrum.name.as_bytes().to_vec())
    }
}

/// Sink failing for one axis and delegating the others to the directory sink
struct FailingSink {
    axis: &'static str,
}

impl ResultSink for FailingSink {
    fn persist(
        &self,
        dir: &Path,
        base: &str,
        axis: &str,
        spectrum: &Spectrum,
        image: &[u8],
    ) -> Result<Artifacts, PersistError> {
        if axis == self.axis {
            return Err(PersistError::Image {
                path: dir.join("denied.png"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        DirectorySink.persist(dir, base, axis, spectrum, image)
    }
}

/// Test helper: target over an existing job directory
fn target(tmp: &TempDir, file_name: &str) -> JobTarget {
    let dir = tmp.path().join("job");
    fs::create_dir_all(&dir).unwrap();
    JobTarget::new(dir, file_name)
}

fn stub_dispatcher() -> Dispatcher {
    Dispatcher::new(Arc::new(StubRenderer), Arc::new(DirectorySink))
}

#[tokio::test]
async fn test_generic_series_eight_samples() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(b"1\n2\n3\n4\n5\n6\n7\n8\n").unwrap();
    let target = target(&tmp, "series.csv");

    let outcomes = stub_dispatcher()
        .run(&rec, &target, &ProcessParams::new(4))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].label, "");
    assert_eq!(outcomes[0].chunks, 2);
    assert_eq!(outcomes[0].image, b"series.csv");

    let table = fs::read_to_string(&outcomes[0].artifacts.table).unwrap();
    assert_eq!(table.lines().count(), 2);
    assert_eq!(
        outcomes[0].artifacts.table.file_name().unwrap(),
        "series.processed.chunksz-4.tsv"
    );
}

#[tokio::test]
async fn test_narrowed_range_gives_one_chunk() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(b"1\n2\n3\n4\n5\n6\n7\n8\n").unwrap();
    let params = ProcessParams {
        beg: 2,
        end: 6,
        ..ProcessParams::new(4)
    };

    let outcomes = stub_dispatcher()
        .run(&rec, &target(&tmp, "series.csv"), &params)
        .await
        .unwrap();
    assert_eq!(outcomes[0].chunks, 1);

    let table = fs::read_to_string(&outcomes[0].artifacts.table).unwrap();
    let row: Vec<f64> = table
        .trim()
        .split('\t')
        .map(|v| v.parse().unwrap())
        .collect();
    // samples [3, 4, 5, 6]: X1 = -2 + 2i, X2 = -2
    assert_eq!(row.len(), 2);
    assert!((row[0] - 8f64.sqrt()).abs() < 1e-9);
    assert!((row[1] - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_invalid_range_rejected_before_work() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(b"1\n2\n3\n4\n").unwrap();
    let params = ProcessParams {
        beg: 3,
        end: 2,
        ..ProcessParams::new(2)
    };
    let target = JobTarget::new(tmp.path().join("job"), "series.csv");

    let err = stub_dispatcher().run(&rec, &target, &params).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Range(RangeError::BegPastEnd { beg: 3, end: 2 })
    ));
    assert!(!target.dir.exists());
}

#[tokio::test]
async fn test_sectioned_log_produces_ordered_axes() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(MSR.as_bytes()).unwrap();

    let outcomes = stub_dispatcher()
        .run(&rec, &target(&tmp, "bench.msr"), &ProcessParams::new(4))
        .await
        .unwrap();

    let labels: Vec<&str> = outcomes.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["x", "y", "z"]);
    assert_eq!(outcomes[1].image, b"bench.msr [axis=y]");
    for axis in ["x", "y", "z"] {
        let dir = tmp.path().join("job");
        assert!(dir.join(format!("bench-{}.png", axis)).exists());
        assert!(dir
            .join(format!("bench-{}.processed.chunksz-4.tsv", axis))
            .exists());
    }
}

#[tokio::test]
async fn test_elapsed_axis_for_sectioned_log() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(MSR.as_bytes()).unwrap();
    let params = ProcessParams {
        x_axis: XAxis::Elapsed,
        ..ProcessParams::new(8)
    };
    let outcomes = stub_dispatcher()
        .run(&rec, &target(&tmp, "bench.msr"), &params)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.chunks == 1));
}

#[tokio::test]
async fn test_missing_channels_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let text = MSR.replace("TIME;ACC x;ACC y;ACC z;", "TIME;ACC x;Temp;ACC z;");
    let rec = Recording::from_bytes(text.as_bytes()).unwrap();

    let outcomes = stub_dispatcher()
        .run(&rec, &target(&tmp, "bench.msr"), &ProcessParams::new(4))
        .await
        .unwrap();
    let labels: Vec<&str> = outcomes.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["x", "z"]);
}

#[tokio::test]
async fn test_no_acceleration_channel_is_error() {
    let tmp = TempDir::new().unwrap();
    let text = MSR.replace("TIME;ACC x;ACC y;ACC z;", "TIME;P;T;H;");
    let rec = Recording::from_bytes(text.as_bytes()).unwrap();

    let err = stub_dispatcher()
        .run(&rec, &target(&tmp, "bench.msr"), &ProcessParams::new(4))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoChannels));
}

#[tokio::test]
async fn test_first_error_reported_and_siblings_finish() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(MSR.as_bytes()).unwrap();
    let dispatcher = Dispatcher::new(Arc::new(StubRenderer), Arc::new(FailingSink { axis: "y" }));

    let err = dispatcher
        .run(&rec, &target(&tmp, "bench.msr"), &ProcessParams::new(4))
        .await
        .unwrap_err();
    match err {
        DispatchError::Axis { axis, .. } => assert_eq!(axis, "y"),
        other => panic!("unexpected error: {}", other),
    }

    let dir = tmp.path().join("job");
    assert!(dir.join("bench-x.processed.chunksz-4.tsv").exists());
    assert!(dir.join("bench-z.processed.chunksz-4.tsv").exists());
    assert!(!dir.join("bench-y.processed.chunksz-4.tsv").exists());
}

#[tokio::test]
async fn test_zero_chunk_size_rejected() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(b"1\n2\n").unwrap();
    let err = stub_dispatcher()
        .run(&rec, &target(&tmp, "s.csv"), &ProcessParams::new(0))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Spectrum(_)));
}

#[tokio::test]
async fn test_default_dispatcher_writes_png() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(b"0\n1\n0\n-1\n0\n1\n0\n-1\n").unwrap();
    let outcomes = Dispatcher::default()
        .run(&rec, &target(&tmp, "wave.csv"), &ProcessParams::new(4))
        .await
        .unwrap();
    let png = fs::read(&outcomes[0].artifacts.image).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    assert_eq!(png, outcomes[0].image);
}

#[tokio::test]
async fn test_artifact_stem_independent_of_display_name() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(MSR.as_bytes()).unwrap();
    let mut target = target(&tmp, "bench.msr");
    target.base = "out".to_string();

    let outcomes = stub_dispatcher()
        .run(&rec, &target, &ProcessParams::new(4))
        .await
        .unwrap();
    assert_eq!(outcomes[0].image, b"bench.msr [axis=x]");
    for axis in ["x", "y", "z"] {
        assert!(target.dir.join(format!("out-{}.png", axis)).exists());
    }
}

#[tokio::test]
async fn test_missing_job_directory_fails_every_axis() {
    let tmp = TempDir::new().unwrap();
    let rec = Recording::from_bytes(MSR.as_bytes()).unwrap();
    let target = JobTarget::new(tmp.path().join("gone"), "bench.msr");

    let err = stub_dispatcher()
        .run(&rec, &target, &ProcessParams::new(4))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Axis {
            source: AxisError::Persist(PersistError::MissingDir { .. }),
            ..
        }
    ));
    assert!(!target.dir.exists());
}
