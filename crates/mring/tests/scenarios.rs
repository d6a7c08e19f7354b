//! End-to-end scenarios: several handles on one name, and multi-rings
//! decomposed from a record type.

use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};
use mring::{MultiRing, Ring, RingError, RingRecord};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct AudioHeader {
    sample_rate: f64,
    channels: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, RingRecord)]
#[repr(C)]
struct Sample {
    x: f64,
    y: f64,
    timestamp: u64,
}

#[cfg(unix)]
#[test]
fn test_two_shm_handles_share_header_and_data() {
    let name = format!("/{}", unique("scenario-shared"));
    let mut creator: Ring<u32, AudioHeader> = Ring::create(&name, 64).unwrap();
    creator.header_mut().unwrap().sample_rate = 44100.0;
    creator.push(42).unwrap();

    let mut second: Ring<u32, AudioHeader> = Ring::open(&name).unwrap();
    assert!(second.is_writable());
    assert_eq!(second.header().sample_rate, 44100.0);
    assert_eq!(second.value_at(0).unwrap(), 42);

    // Writes travel the other way too.
    second.insert(12345, 0).unwrap();
    assert_eq!(creator.value_at(0).unwrap(), 12345);

    second.close().unwrap();
    creator.close().unwrap();
    assert!(!Ring::<u32, AudioHeader>::exists(&name));
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
#[test]
fn test_memfd_second_handle_is_read_only_mirror_of_creator() {
    let name = unique("scenario-memfd");
    let mut creator: Ring<u32, AudioHeader> = Ring::create(&name, 64).unwrap();
    creator.header_mut().unwrap().sample_rate = 48000.0;
    creator.push(42).unwrap();

    // Memfd secondary handles attach read-only; they see the creator's
    // mutations but cannot write back.
    let mut second: Ring<u32, AudioHeader> = Ring::open(&name).unwrap();
    assert!(!second.is_writable());
    assert_eq!(second.header().sample_rate, 48000.0);
    assert_eq!(second.value_at(0).unwrap(), 42);
    assert!(matches!(
        second.insert(12345, 0),
        Err(RingError::AccessDenied(_))
    ));

    creator.push(77).unwrap();
    assert_eq!(second.value_at(1).unwrap(), 77);

    second.close().unwrap();
    creator.close().unwrap();
}

#[test]
fn test_multi_ring_columnar_push() {
    let name = unique("scenario-multi");
    let mut multi: MultiRing<Sample> = MultiRing::create(&name, 1000).unwrap();
    assert!(multi.len() >= 1000);

    multi
        .push_columns(SampleSlice {
            x: &[1.0, 2.0, 3.0],
            y: &[4.0, 5.0, 6.0],
            timestamp: &[100, 101, 102],
        })
        .unwrap();

    let window = multi.slice_from_tail(3).unwrap();
    assert_eq!(window.x, &[1.0, 2.0, 3.0]);
    assert_eq!(window.y, &[4.0, 5.0, 6.0]);
    assert_eq!(window.timestamp, &[100, 101, 102]);

    assert_eq!(multi.rings().x.state().count, 3);
    assert_eq!(multi.rings().y.state().count, 3);
    assert_eq!(multi.rings().timestamp.state().count, 3);
    multi.close().unwrap();
}

#[test]
fn test_multi_ring_record_push_advances_every_field() {
    let mut multi: MultiRing<Sample> = MultiRing::create(&unique("scenario-rec"), 100).unwrap();

    let pushed = multi
        .push(Sample {
            x: 1.5,
            y: -2.5,
            timestamp: 7,
        })
        .unwrap();
    assert_eq!(
        pushed,
        SamplePushed {
            x: 1,
            y: 1,
            timestamp: 1
        }
    );

    multi
        .push_values(&[
            Sample {
                x: 2.5,
                y: -3.5,
                timestamp: 8,
            },
            Sample {
                x: 3.5,
                y: -4.5,
                timestamp: 9,
            },
        ])
        .unwrap();

    // Field-by-field correspondence: record i is the i-th element of every
    // column.
    let window = multi.slice_from_tail(3).unwrap();
    assert_eq!(window.x, &[1.5, 2.5, 3.5]);
    assert_eq!(window.y, &[-2.5, -3.5, -4.5]);
    assert_eq!(window.timestamp, &[7, 8, 9]);

    let latest = multi.slice_to_head(1).unwrap();
    assert_eq!(latest.x, &[3.5]);
    assert_eq!(latest.timestamp, &[9]);
    multi.close().unwrap();
}

#[test]
fn test_multi_ring_sub_rings_share_element_count() {
    let multi: MultiRing<Sample> = MultiRing::create(&unique("scenario-sync"), 1000).unwrap();
    let len = multi.len();
    assert_eq!(multi.rings().x.len(), len);
    assert_eq!(multi.rings().y.len(), len);
    assert_eq!(multi.rings().timestamp.len(), len);
    multi.close().unwrap();
}

#[test]
fn test_multi_ring_existence() {
    let name = unique("scenario-exists");
    assert!(!MultiRing::<Sample>::exists(&name));
    let multi: MultiRing<Sample> = MultiRing::create(&name, 10).unwrap();
    assert!(MultiRing::<Sample>::exists(&name));
    // Sub-rings carry the decorated names.
    assert!(Ring::<f64>::exists(&format!("{name}-x")));
    assert!(Ring::<u64>::exists(&format!("{name}-timestamp")));
    multi.close().unwrap();
    assert!(!MultiRing::<Sample>::exists(&name));
}

#[test]
fn test_multi_ring_per_field_access() {
    let mut multi: MultiRing<Sample> = MultiRing::create(&unique("scenario-field"), 10).unwrap();
    multi.rings_mut().x.push(9.0).unwrap();
    multi.rings_mut().x.push(10.0).unwrap();
    assert_eq!(multi.rings().x.value_at(1).unwrap(), 10.0);
    assert_eq!(multi.rings().x.state().count, 2);
    // Per-field pushes do not touch the other columns.
    assert_eq!(multi.rings().y.state().count, 0);
    multi.close().unwrap();
}

#[cfg(unix)]
#[test]
fn test_multi_ring_reopen_by_name() {
    let name = format!("/{}", unique("scenario-multi-open"));
    let mut producer: MultiRing<Sample> = MultiRing::create(&name, 100).unwrap();
    producer
        .push_columns(SampleSlice {
            x: &[1.0],
            y: &[2.0],
            timestamp: &[3],
        })
        .unwrap();

    let consumer: MultiRing<Sample> = MultiRing::open(&name).unwrap();
    assert_eq!(consumer.len(), producer.len());
    let window = consumer.slice_from_tail(1).unwrap();
    assert_eq!(window.x, &[1.0]);
    assert_eq!(window.y, &[2.0]);
    assert_eq!(window.timestamp, &[3]);

    consumer.close().unwrap();
    producer.close().unwrap();
}

#[test]
fn test_registry_and_config_describe_a_ring() {
    let name = unique("scenario-registry");
    let ring: Ring<u64> = Ring::create(&name, 16).unwrap();

    let manifest = std::env::temp_dir().join(format!("{}.txt", unique("scenario-manifest")));
    let mut registry = mring::RingRegistry::new(&manifest);
    registry.register(ring.name(), ring.backing_path()).unwrap();
    assert!(registry.backing_path(&name).is_some());

    let config = ring.config("scenario");
    assert_eq!(config.shm_path, ring.backing_path());
    assert_eq!(config.element_size, 8);

    ring.close().unwrap();
}
