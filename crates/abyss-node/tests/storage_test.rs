//! RocksDB persistence across reopen.

use abyss_core::error::StorageError;
use abyss_core::traits::CurseStore;
use abyss_core::types::{CurseSnapshot, EntityId, Narehate, NarehateVariant};
use abyss_node_lib::storage::RocksStore;

fn snapshot(layer: u8) -> CurseSnapshot {
    CurseSnapshot {
        safe_height: 42.0,
        last_y: 40.5,
        current_layer: layer,
        curse_start_ms: 1_700_000_000_000,
        curse_duration_ticks: 9_600,
        curse_arm: 2,
        narehate: Narehate::None,
    }
}

#[test]
fn snapshots_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let a = EntityId::from_u128(1);
    let b = EntityId::from_u128(2);
    {
        let store = RocksStore::open(dir.path()).unwrap();
        store.save(&a, &snapshot(3)).unwrap();
        store.save(&b, &snapshot(0)).unwrap();
        store.flush().unwrap();
    }
    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(store.entity_count().unwrap(), 2);
    assert_eq!(store.load(&a).unwrap(), Some(snapshot(3)));
    assert_eq!(store.load(&b).unwrap(), Some(snapshot(0)));
    assert_eq!(store.load(&EntityId::from_u128(3)).unwrap(), None);
}

#[test]
fn save_overwrites_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    let id = EntityId::from_u128(7);
    store.save(&id, &snapshot(3)).unwrap();
    let converted = CurseSnapshot {
        narehate: Narehate::Converted(NarehateVariant::Sad),
        ..snapshot(0)
    };
    store.save(&id, &converted).unwrap();
    assert_eq!(store.load(&id).unwrap(), Some(converted));
    assert_eq!(store.entity_count().unwrap(), 1);
}

#[test]
fn corrupt_bytes_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    let id = EntityId::from_u128(9);
    store.put_raw(&id, &[1, 2, 3]).unwrap();
    match store.load(&id) {
        Err(StorageError::Corrupt { entity, .. }) => assert_eq!(entity, id.to_string()),
        other => panic!("expected corrupt error, got {other:?}"),
    }
}

#[test]
fn exemptions_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let a = EntityId::from_u128(10);
    let b = EntityId::from_u128(11);
    {
        let store = RocksStore::open(dir.path()).unwrap();
        store.save_exemption(&a).unwrap();
        store.save_exemption(&b).unwrap();
        store.remove_exemption(&a).unwrap();
        store.flush().unwrap();
    }
    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(store.load_exemptions().unwrap(), vec![b]);
}
