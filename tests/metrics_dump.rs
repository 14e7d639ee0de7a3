// tests/metrics_dump.rs
//
// Own test binary: installs the global Prometheus recorder.

use metrics::counter;
use playlist_harvester::metrics::MetricsDump;

#[test]
fn dump_writes_prometheus_exposition() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/metrics.prom");
    let dump = MetricsDump::install(&path).unwrap();

    counter!("harvest_playlists_persisted_total").increment(3);
    dump.write().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("harvest_playlists_persisted_total 3"), "{text}");
    assert!(text.contains("# HELP harvest_playlists_persisted_total"));

    // A second global recorder is refused.
    assert!(MetricsDump::install(dir.path().join("again.prom")).is_err());
}
