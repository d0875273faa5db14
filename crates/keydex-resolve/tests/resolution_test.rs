//! End-to-end resolution tests over the fake bus

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use keydex_core::{capability, DeviceHandle, IdentityKey, Transport};
use keydex_query::{FakeBus, FakeDevice};
use keydex_resolve::{RefreshMode, ResolutionEngine, ResolverConfig};

type FakeEngine = ResolutionEngine<Arc<FakeBus>, Arc<FakeBus>, Arc<FakeBus>>;

fn engine(bus: &Arc<FakeBus>, config: ResolverConfig) -> FakeEngine {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    ResolutionEngine::new(config, bus.clone(), bus.clone(), bus.clone())
}

fn identity_keys(devices: &[keydex_core::CompositeDevice]) -> BTreeSet<String> {
    devices
        .iter()
        .map(|d| format!("{:?}", d.identity_key()))
        .collect()
}

#[test]
fn serial_merge_across_transports() {
    // Two interfaces of one key, different transports, no shared parent:
    // only the serial reported by live queries ties them together.
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .version(semver::Version::new(5, 7, 1))
            .capabilities(capability::CAP_FIDO2 | capability::CAP_PIV)
            .handle(DeviceHandle::new(Transport::HidOtp, "/dev/hidraw0"))
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );

    let engine = engine(&bus, ResolverConfig::default());
    let devices = engine.enumerate().unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].handles.len(), 2);
    assert_eq!(devices[0].serial(), Some("123456"));

    let info = devices[0].info.as_ref().unwrap();
    assert_eq!(info.version, semver::Version::new(5, 7, 1));
    assert!(info.has_capability(capability::CAP_PIV));
    assert!(!info.has_capability(capability::CAP_OATH));
}

#[test]
fn re_resolution_is_idempotent() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::HidOtp, "/dev/hidraw0"))
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );
    bus.add_device(
        FakeDevice::with_serial("654321")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-1")),
    );

    let engine = engine(
        &bus,
        ResolverConfig::default().with_refresh(RefreshMode::Incremental),
    );

    let first = engine.enumerate().unwrap();
    let second = engine.enumerate().unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(identity_keys(&first), identity_keys(&second));
}

#[test]
fn structural_match_skips_live_query() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );

    let engine = engine(&bus, ResolverConfig::default());

    engine.enumerate().unwrap();
    assert_eq!(bus.open_count("reader-0"), 1);

    // Second pass resolves structurally; no session may be opened
    engine.enumerate().unwrap();
    assert_eq!(bus.open_count("reader-0"), 1);
}

#[test]
fn topological_merge_on_shared_parent() {
    // Scenario from the device model: a key first shows only its HID
    // interface, then additionally its smart-card interface under the
    // same USB parent. The second pass must merge, not duplicate.
    let bus = Arc::new(FakeBus::new());
    bus.set_elevated(true);
    bus.add_device(
        FakeDevice::with_serial("111111")
            .handle(DeviceHandle::with_parent(Transport::HidFido, "hid-a", "p1")),
    );

    let engine = engine(&bus, ResolverConfig::default());
    let first = engine.enumerate().unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].handles.len(), 1);

    bus.add_device(
        FakeDevice::with_serial("111111")
            .handle(DeviceHandle::with_parent(Transport::SmartCard, "sc-b", "p1")),
    );

    let second = engine.enumerate().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].handles.len(), 2);
    // Merged via topology, so the new interface was never queried
    assert_eq!(bus.open_count("sc-b"), 0);
}

#[test]
fn exclusively_held_handle_is_skipped() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );
    bus.add_device(
        FakeDevice::with_serial("654321")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-1")),
    );
    bus.hold_exclusive("reader-0");

    let engine = engine(&bus, ResolverConfig::default());
    let devices = engine.enumerate().unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].serial(), Some("654321"));

    // Once the other process lets go, the device appears
    bus.release_exclusive("reader-0");
    let devices = engine.enumerate().unwrap();
    assert_eq!(devices.len(), 2);
}

#[test]
fn no_serial_devices_are_never_merged() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::without_serial()
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );
    bus.add_device(
        FakeDevice::without_serial()
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-1")),
    );

    let engine = engine(&bus, ResolverConfig::default());
    let devices = engine.enumerate().unwrap();

    assert_eq!(devices.len(), 2);
    for device in &devices {
        assert!(matches!(device.identity_key(), IdentityKey::Structural(_)));
    }
    assert_eq!(identity_keys(&devices).len(), 2);
}

#[test]
fn incremental_mode_retains_unplugged_devices() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );
    bus.add_device(
        FakeDevice::with_serial("654321")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-1")),
    );

    let engine = engine(
        &bus,
        ResolverConfig::default().with_refresh(RefreshMode::Incremental),
    );
    assert_eq!(engine.enumerate().unwrap().len(), 2);

    bus.remove_path("reader-1");

    // Unplugged device stays cached until pruned
    assert_eq!(engine.enumerate().unwrap().len(), 2);
    assert_eq!(engine.prune_unseen().unwrap(), 1);
    assert_eq!(engine.devices().unwrap().len(), 1);
}

#[test]
fn full_rescan_mode_drops_unplugged_devices() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );
    bus.add_device(
        FakeDevice::with_serial("654321")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-1")),
    );

    let engine = engine(
        &bus,
        ResolverConfig::default().with_refresh(RefreshMode::FullRescan),
    );
    assert_eq!(engine.enumerate().unwrap().len(), 2);

    bus.remove_path("reader-1");
    assert_eq!(engine.enumerate().unwrap().len(), 1);
}

#[test]
fn denied_transport_does_not_abort_the_pass() {
    let bus = Arc::new(FakeBus::new());
    bus.deny_transport(Transport::HidOtp);
    bus.fail_transport(Transport::HidFido, "hid subsystem unavailable");
    bus.set_elevated(true);
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );

    let engine = engine(&bus, ResolverConfig::default());
    let devices = engine.enumerate().unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].serial(), Some("123456"));
}

#[test]
fn elevation_gated_transport_is_skipped_when_unelevated() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::HidFido, "/dev/hidraw0")),
    );

    let engine = engine(
        &bus,
        ResolverConfig::default().with_transports(vec![Transport::HidFido]),
    );

    assert!(engine.enumerate().unwrap().is_empty());

    bus.set_elevated(true);
    assert_eq!(engine.enumerate().unwrap().len(), 1);
}

#[test]
fn snapshots_are_detached_from_the_cache() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );

    let engine = engine(&bus, ResolverConfig::default());
    let mut devices = engine.enumerate().unwrap();
    devices[0].absorb(DeviceHandle::new(Transport::HidOtp, "/dev/hidraw9"));

    let fresh = engine.devices().unwrap();
    assert_eq!(fresh[0].handles.len(), 1);
}

#[test]
fn concurrent_passes_serialize() {
    let bus = Arc::new(FakeBus::new());
    bus.add_device(
        FakeDevice::with_serial("123456")
            .handle(DeviceHandle::new(Transport::HidOtp, "/dev/hidraw0"))
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-0")),
    );
    bus.add_device(
        FakeDevice::with_serial("654321")
            .handle(DeviceHandle::new(Transport::SmartCard, "reader-1")),
    );

    let engine = Arc::new(engine(&bus, ResolverConfig::default()));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    let devices = engine.enumerate().unwrap();
                    assert!(devices.len() <= 2);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // Net state is as if the passes ran sequentially: no duplicates
    let devices = engine.devices().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(identity_keys(&devices).len(), 2);
}
