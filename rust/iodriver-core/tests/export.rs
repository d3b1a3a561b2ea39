use std::collections::HashSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use iodriver_core::{
    ErrorKind, ExportId, ExportResolver, ResolverError, StubExportResolver, VolumeDescriptor,
    VolumeExportResolver, VolumeLimits, VolumeQosSettings,
};
use parking_lot::Mutex;
use proptest::prelude::*;

fn limits(object_size: u64, max_capacity: u64) -> VolumeLimits {
    VolumeLimits {
        object_size,
        max_capacity,
    }
}

fn descriptor(name: &str) -> VolumeDescriptor {
    VolumeDescriptor {
        name: name.to_string(),
        tenant_id: None,
        qos: VolumeQosSettings::default(),
    }
}

#[test]
fn stub_resolver_maps_its_single_volume() {
    let resolver = StubExportResolver::new("v", ExportId(1), limits(4096, 10_000_000));

    assert_eq!(resolver.nfs_export_id("v").unwrap(), ExportId(1));
    assert_eq!(resolver.volume_name(ExportId(1)).unwrap(), "v");
    assert_eq!(resolver.object_size("v").unwrap(), 4096);
    assert_eq!(resolver.max_volume_capacity_in_bytes("v").unwrap(), 10_000_000);
    assert_eq!(resolver.export_names(), vec!["v".to_string()]);
    assert!(resolver.exists("v"));
    assert!(!resolver.exists("other"));

    let err = resolver.nfs_export_id("other").unwrap_err();
    assert_matches!(err, ResolverError::UnknownVolume(ref v) if v == "other");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_matches!(
        resolver.volume_name(ExportId(2)),
        Err(ResolverError::UnknownExport(ExportId(2)))
    );

    resolver.add_volume_delete_event_handler(Box::new(|_| Ok(())));
    assert_eq!(resolver.handler_count(), 1);
}

#[test]
fn limit_checks_use_the_resolver_limits() {
    let resolver = StubExportResolver::new("v", ExportId(1), limits(4096, 10_000_000));

    resolver.check_object_write("v", 4096).unwrap();
    assert_matches!(
        resolver.check_object_write("v", 4097),
        Err(ResolverError::ObjectTooLarge { len: 4097, limit: 4096, .. })
    );

    resolver.check_capacity("v", 9_000_000, 1_000_000).unwrap();
    assert_matches!(
        resolver.check_capacity("v", 9_000_000, 1_000_001),
        Err(ResolverError::CapacityExceeded { requested: 10_000_001, .. })
    );
    assert_matches!(
        resolver.check_capacity("v", u64::MAX, 1),
        Err(ResolverError::CapacityExceeded { .. })
    );
    assert_matches!(
        resolver.check_object_write("missing", 1),
        Err(ResolverError::UnknownVolume(_))
    );
}

#[test]
fn dynamic_resolver_allocates_lowest_free_id() {
    let resolver = VolumeExportResolver::new(VolumeLimits::default());
    assert_eq!(resolver.add_volume("a", VolumeLimits::default()).unwrap(), ExportId(1));
    assert_eq!(resolver.add_volume("b", VolumeLimits::default()).unwrap(), ExportId(2));
    assert_eq!(resolver.add_volume("c", VolumeLimits::default()).unwrap(), ExportId(3));

    resolver.remove_volume("b").unwrap();
    assert_eq!(resolver.add_volume("d", VolumeLimits::default()).unwrap(), ExportId(2));
    assert_eq!(resolver.export_names(), vec!["a", "d", "c"]);

    assert_matches!(
        resolver.add_volume("a", VolumeLimits::default()),
        Err(ResolverError::VolumeExists(_))
    );
    assert_matches!(
        resolver.add_volume_with_id("e", ExportId(3), VolumeLimits::default()),
        Err(ResolverError::ExportIdInUse(ExportId(3)))
    );
    resolver
        .add_volume_with_id("e", ExportId(10), limits(512, 1024))
        .unwrap();
    assert_eq!(resolver.object_size("e").unwrap(), 512);
    assert_eq!(resolver.add_volume("f", VolumeLimits::default()).unwrap(), ExportId(4));
}

#[test]
fn delete_handlers_run_in_order_before_the_mapping_goes() {
    let resolver = Arc::new(VolumeExportResolver::new(VolumeLimits::default()));
    let id = resolver.add_volume("v", VolumeLimits::default()).unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));

    for n in 0..3 {
        let calls = calls.clone();
        let r = resolver.clone();
        resolver.add_volume_delete_event_handler(Box::new(move |volume| {
            // the mapping is still intact while handlers run
            calls.lock().push((n, volume.to_string(), r.exists(volume)));
            Ok(())
        }));
    }

    assert_eq!(resolver.remove_volume("v").unwrap(), id);
    assert_eq!(
        *calls.lock(),
        vec![
            (0, "v".to_string(), true),
            (1, "v".to_string(), true),
            (2, "v".to_string(), true),
        ]
    );
    assert!(!resolver.exists("v"));
    assert_matches!(resolver.nfs_export_id("v"), Err(ResolverError::UnknownVolume(_)));
    assert_matches!(resolver.volume_name(id), Err(ResolverError::UnknownExport(_)));
    assert_matches!(resolver.remove_volume("v"), Err(ResolverError::UnknownVolume(_)));
}

#[test]
fn failing_handler_does_not_stop_the_others_or_the_removal() {
    let resolver = VolumeExportResolver::new(VolumeLimits::default());
    resolver.add_volume("v", VolumeLimits::default()).unwrap();
    let ran = Arc::new(Mutex::new(Vec::new()));

    let r = ran.clone();
    resolver.add_volume_delete_event_handler(Box::new(move |_| {
        r.lock().push(0);
        anyhow::bail!("open handles could not be invalidated")
    }));
    let r = ran.clone();
    resolver.add_volume_delete_event_handler(Box::new(move |_| {
        r.lock().push(1);
        Ok(())
    }));

    let err = resolver.remove_volume("v").unwrap_err();
    assert_matches!(
        err,
        ResolverError::DeleteHandlersFailed { ref failures, .. }
            if failures.len() == 1 && failures[0].index == 0
    );
    assert_eq!(*ran.lock(), vec![0, 1]);
    assert!(!resolver.exists("v"));
    assert!(resolver.export_names().is_empty());
}

#[test]
fn panicking_handler_is_reported_and_the_rest_still_run() {
    let resolver = VolumeExportResolver::new(VolumeLimits::default());
    resolver.add_volume("v", VolumeLimits::default()).unwrap();
    let ran = Arc::new(Mutex::new(Vec::new()));

    resolver.add_volume_delete_event_handler(Box::new(|_| panic!("cache shard poisoned")));
    let r = ran.clone();
    resolver.add_volume_delete_event_handler(Box::new(move |v| {
        r.lock().push(v.to_string());
        Ok(())
    }));

    let err = resolver.remove_volume("v").unwrap_err();
    assert_matches!(
        err,
        ResolverError::DeleteHandlersFailed { ref failures, .. }
            if failures.len() == 1
                && failures[0].index == 0
                && failures[0].message.contains("cache shard poisoned")
    );
    assert_eq!(*ran.lock(), vec!["v".to_string()]);
    assert!(!resolver.exists("v"));
    // the lock is not left held after the unwind
    resolver.add_volume("v", VolumeLimits::default()).unwrap();
}

#[test]
fn reconcile_follows_the_platform_volume_list() {
    let resolver = VolumeExportResolver::new(limits(8192, 1 << 30));
    resolver.add_volume("gone", VolumeLimits::default()).unwrap();
    resolver.add_volume("kept", VolumeLimits::default()).unwrap();
    let removed = Arc::new(Mutex::new(Vec::new()));
    let r = removed.clone();
    resolver.add_volume_delete_event_handler(Box::new(move |v| {
        r.lock().push(v.to_string());
        Ok(())
    }));

    resolver
        .reconcile(&[descriptor("kept"), descriptor("new")])
        .unwrap();

    assert_eq!(*removed.lock(), vec!["gone".to_string()]);
    let names: HashSet<String> = resolver.export_names().into_iter().collect();
    assert_eq!(names, HashSet::from(["kept".to_string(), "new".to_string()]));
    assert_eq!(resolver.nfs_export_id("new").unwrap(), ExportId(1));
    assert_eq!(resolver.object_size("new").unwrap(), 8192);
}

proptest! {
    #[test]
    fn lookups_in_both_directions_agree(
        names in proptest::collection::hash_set("[a-z]{1,8}", 1..32),
        remove_every in 2usize..5,
    ) {
        let resolver = VolumeExportResolver::new(VolumeLimits::default());
        let names: Vec<String> = names.into_iter().collect();
        for name in &names {
            resolver.add_volume(name, VolumeLimits::default()).unwrap();
        }
        for name in names.iter().step_by(remove_every) {
            resolver.remove_volume(name).unwrap();
        }

        let mut seen = HashSet::new();
        for name in resolver.export_names() {
            let id = resolver.nfs_export_id(&name).unwrap();
            prop_assert!(seen.insert(id));
            prop_assert_eq!(resolver.volume_name(id).unwrap(), name.clone());
            prop_assert_eq!(resolver.nfs_export_id(&resolver.volume_name(id).unwrap()).unwrap(), id);
        }
        for name in names.iter().step_by(remove_every) {
            prop_assert!(!resolver.exists(name));
        }
    }
}
