use std::path::Path;

use cadence_core::{
    fixtures::{demo_config, demo_tracks, write_demo_kit},
    persistence::{PROJECT_METADATA_FILE, load_project, save_project},
};
use proptest::prelude::*;

fn no_panic_load(container: &Path) -> bool {
    std::panic::catch_unwind(|| {
        let _ = load_project(container);
    })
    .is_ok()
}

/// Saves the demo project and returns the metadata bytes for tampering.
fn saved_demo(root: &Path) -> (std::path::PathBuf, Vec<u8>) {
    let kit = write_demo_kit(&root.join("kit")).expect("demo kit should be written");
    let container = root.join("corrupt.cadence");
    save_project(&container, &demo_tracks(&kit), &demo_config())
        .expect("saving fixture project should work");
    let payload =
        std::fs::read(container.join(PROJECT_METADATA_FILE)).expect("reading metadata should work");
    (container, payload)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_metadata_bytes_do_not_panic(raw in prop::collection::vec(any::<u8>(), 0..4096)) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let container = temp.path().join("random.cadence");
        std::fs::create_dir_all(&container).expect("container should be creatable");
        std::fs::write(container.join(PROJECT_METADATA_FILE), raw)
            .expect("writing random payload should work");
        prop_assert!(no_panic_load(&container));
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn truncated_metadata_does_not_panic(prefix_len in 0usize..4096usize) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let (container, mut payload) = saved_demo(temp.path());

        payload.truncate(prefix_len.min(payload.len()));
        std::fs::write(container.join(PROJECT_METADATA_FILE), payload)
            .expect("writing truncated payload should work");

        prop_assert!(no_panic_load(&container));
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn mutated_metadata_does_not_panic(index in 0usize..4096usize, delta in any::<u8>()) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let (container, mut payload) = saved_demo(temp.path());

        if !payload.is_empty() {
            let target = index % payload.len();
            payload[target] ^= delta.max(1);
        }
        std::fs::write(container.join(PROJECT_METADATA_FILE), payload)
            .expect("writing mutated payload should work");

        prop_assert!(no_panic_load(&container));
    }
}
