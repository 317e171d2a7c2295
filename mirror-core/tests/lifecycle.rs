//! Process runtime lifecycle. Runs in its own test binary because it
//! shuts the shared runtime down.

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use mirror_core::{Mirror, MirrorError, MirrorOptions, NullSink};

#[test]
fn sessions_need_a_started_runtime() {
    assert!(!mirror_core::is_started());
    let err = assert_err!(Mirror::new(MirrorOptions::default()));
    assert!(matches!(err, MirrorError::NotStarted));

    assert_ok!(mirror_core::startup());
    assert_ok!(mirror_core::startup());
    assert!(mirror_core::is_started());

    let mirror = assert_ok!(Mirror::new(MirrorOptions {
        bind: Some("127.0.0.1:0".into()),
        ..Default::default()
    }));
    let receiver = assert_ok!(mirror.create_receiver(1, "zstd", Arc::new(NullSink)));
    receiver.destroy();
    drop(mirror);

    mirror_core::shutdown();
    assert!(!mirror_core::is_started());
    let err = assert_err!(Mirror::new(MirrorOptions::default()));
    assert!(matches!(err, MirrorError::NotStarted));

    // A second cycle works the same way.
    assert_ok!(mirror_core::startup());
    assert_ok!(Mirror::new(MirrorOptions::default()));
    mirror_core::shutdown();
}
