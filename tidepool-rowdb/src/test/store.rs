use super::{mem_db, people};
use crate::{BaseTable, BatchStore, ConnMode, MovingSink, ScanRequest};
use std::collections::BTreeSet;
use test_log::test;
use tidepool_base::{ErrorKind, Result};
use tidepool_coldb::{
    BatchBuilder, BatchKey, BatchSink, BuildOptions, ColumnBatch, Cmp, Filter, Predicate, Uuid,
};
use tidepool_lang::{row, Row, Val};

fn person(i: i64) -> Row {
    row![i, format!("p{}", i).as_str(), i as f64 / 2.0]
}

// Loads `n` rows into `bucket`, in batches of `limit`.
fn load(store: &BatchStore, bucket: i32, ids: std::ops::Range<i64>, limit: usize) -> Result<Vec<BatchKey>> {
    let mut b = BatchBuilder::open(store.schema().clone(), bucket, BuildOptions::new(limit, true))?;
    let mut keys = Vec::new();
    for i in ids {
        keys.extend(b.append(&person(i), store)?);
    }
    keys.extend(b.force_flush(store)?);
    Ok(keys)
}

#[test]
fn test_persist_and_scan_round_trip() -> Result<()> {
    let store = BatchStore::open(mem_db(), "people", people(), ConnMode::Embedded, 0)?;
    let keys = load(&store, 2, 0..25, 10)?;
    assert_eq!(keys.len(), 3);
    assert_eq!(store.batch_count()?, 3);
    let mut rows = Vec::new();
    let mut seen = BTreeSet::new();
    for batch in store.scan(&ScanRequest::all())? {
        let batch = batch?;
        assert!(seen.insert(batch.key()));
        rows.extend(batch.decode_rows()?);
    }
    rows.sort();
    assert_eq!(rows, (0..25).map(person).collect::<Vec<_>>());
    assert_eq!(seen, keys.into_iter().collect::<BTreeSet<_>>());
    Ok(())
}

#[test]
fn test_projection_decodes_requested_columns() -> Result<()> {
    let store = BatchStore::open(mem_db(), "people", people(), ConnMode::Embedded, 0)?;
    load(&store, 0, 0..4, 10)?;
    let mut scan = store.scan(&ScanRequest::all().columns(&["SCORE", "id"]))?;
    let batch = scan.next().expect("one batch")?;
    assert!(scan.next().is_none());
    assert_eq!(batch.positions(), &[2, 0]);
    assert_eq!(batch.column_named("id")?.iter().collect::<Vec<_>>(), vec![Val::Int(0), Val::Int(1), Val::Int(2), Val::Int(3)]);
    assert_eq!(batch.decode_rows()?[3], row![1.5, 3_i64]);
    assert_eq!(batch.stats().cols[1].hi, Val::Int(3));
    let e = store.scan(&ScanRequest::all().columns(&["nope"])).err();
    assert!(e.map(|e| e.is(ErrorKind::SchemaMismatch)).unwrap_or(false));
    Ok(())
}

#[test]
fn test_projection_repeats_a_column() -> Result<()> {
    let store = BatchStore::open(mem_db(), "people", people(), ConnMode::Embedded, 0)?;
    load(&store, 0, 0..3, 10)?;
    let mut scan = store.scan(&ScanRequest::all().columns(&["id", "name", "ID"]))?;
    assert_eq!(scan.schema().len(), 3);
    let batch = scan.next().expect("one batch")?;
    assert_eq!(batch.positions(), &[0, 1, 0]);
    assert_eq!(batch.decode_rows()?[2], row![2_i64, "p2", 2_i64]);
    Ok(())
}

#[test]
fn test_duplicate_key_and_invalid_bucket() -> Result<()> {
    let store = BatchStore::open(mem_db(), "people", people(), ConnMode::Embedded, 0)?;
    let id = Uuid::new_v4();
    let mut b = BatchBuilder::open(people(), 1, BuildOptions::new(10, true))?;
    b.append(&person(1), &store)?;
    b.force_flush_with_id(&store, id)?;
    b.append(&person(2), &store)?;
    let e = b.force_flush_with_id(&store, id).unwrap_err();
    assert!(e.is(ErrorKind::Persist));
    assert_eq!(b.pending_rows(), 0);
    assert_eq!(store.batch_count()?, 1);

    // Same uuid in another bucket is a different primary key.
    let mut b = BatchBuilder::open(people(), 2, BuildOptions::new(10, true))?;
    b.append(&person(3), &store)?;
    assert!(b.force_flush_with_id(&store, id)?.is_some());

    let batch = ColumnBatch::from_parts(BatchKey::new(Uuid::new_v4(), -1), 0, Vec::new(), Default::default());
    assert!(store.persist(&batch).unwrap_err().is(ErrorKind::Persist));
    assert_eq!(store.batch_count()?, 2);
    Ok(())
}

#[test]
fn test_assign_key() -> Result<()> {
    let store = BatchStore::open(mem_db(), "people", people(), ConnMode::Embedded, 0)?;
    let id = Uuid::new_v4();
    assert_eq!(store.assign_key(4, Some(id)), BatchKey::new(id, 4));
    let a = store.assign_key(4, None);
    let b = store.assign_key(4, None);
    assert_ne!(a.uuid, b.uuid);
    assert_eq!(a.uuid.get_version_num(), 4);
    Ok(())
}

#[test]
fn test_bucket_restricted_scan() -> Result<()> {
    for mode in [ConnMode::Embedded, ConnMode::Remote] {
        let store = BatchStore::open(mem_db(), "people", people(), mode, 0)?;
        for bucket in 0..4 {
            load(&store, bucket, (bucket as i64 * 10)..(bucket as i64 * 10 + 5), 2)?;
        }
        let buckets = store
            .scan(&ScanRequest::all().buckets(&[1, 3]))?
            .map(|b| b.map(|b| b.key().bucket))
            .collect::<Result<BTreeSet<i32>>>()?;
        assert_eq!(buckets, BTreeSet::from([1, 3]));
        let n = store.scan(&ScanRequest::all().buckets(&[1, 3]))?.count();
        assert_eq!(n, 6);
    }
    Ok(())
}

#[test]
fn test_refused_scope_falls_back() -> Result<()> {
    let store = BatchStore::open(mem_db(), "people", people(), ConnMode::Embedded, 0)?;
    load(&store, 0, 0..3, 10)?;
    load(&store, 5, 3..6, 10)?;
    let batches = store
        .scan(&ScanRequest::all().buckets(&[-1, 5]))?
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].key().bucket, 5);
    Ok(())
}

#[test]
fn test_stats_pruning() -> Result<()> {
    let store = BatchStore::open(mem_db(), "people", people(), ConnMode::Embedded, 0)?;
    load(&store, 0, 0..100, 10)?;
    let filter = Filter::all().and(Predicate::new(0, Cmp::Ge, 75_i64));
    let scan = store.scan(&ScanRequest::all().filter(filter))?;
    assert_eq!(scan.pruned(), 7);
    let ids = scan
        .map(|b| b.and_then(|b| b.column(0)))
        .collect::<Result<Vec<_>>>()?
        .iter()
        .flat_map(|c| c.iter().collect::<Vec<_>>())
        .collect::<Vec<Val>>();
    assert_eq!(ids.len(), 30);
    assert_eq!(ids.iter().min(), Some(&Val::Int(70)));

    let filter = Filter::all().and(Predicate::is_null(1));
    assert_eq!(store.scan(&ScanRequest::all().filter(filter))?.count(), 0);
    Ok(())
}

#[test]
fn test_moving_sink_is_atomic() -> Result<()> {
    let db = mem_db();
    db.ensure_table("people")?;
    let base = BaseTable::new(db.clone(), "people");
    let store = BatchStore::open(db, "people", people(), ConnMode::Embedded, 0)?;
    base.append(0, &(0..3).map(person).collect::<Vec<_>>())?;
    let rows = base.bucket_rows(0)?;
    let (keys, rows): (Vec<Vec<u8>>, Vec<Row>) = rows.into_iter().unzip();

    let sink = MovingSink::new(&store, &base, keys.clone());
    let mut b = BatchBuilder::open(people(), 0, BuildOptions::new(3, true))?;
    for r in rows.iter() {
        b.append(r, &sink)?;
    }
    assert!(base.is_empty()?);
    assert_eq!(store.batch_count()?, 1);

    // Moving the same rows again must fail and leave no batch behind.
    base.append(0, &[person(9)])?;
    let sink = MovingSink::new(&store, &base, keys);
    let mut b = BatchBuilder::open(people(), 0, BuildOptions::new(3, true))?;
    b.append(&person(9), &sink)?;
    assert!(b.force_flush(&sink).unwrap_err().is(ErrorKind::Persist));
    assert_eq!(store.batch_count()?, 1);
    assert_eq!(base.len()?, 1);
    Ok(())
}

#[test]
fn test_truncate_and_drop() -> Result<()> {
    let db = mem_db();
    let store = BatchStore::open(db.clone(), "people", people(), ConnMode::Embedded, 0)?;
    load(&store, 0, 0..20, 5)?;
    let mut scan = store.scan(&ScanRequest::all())?;
    let first = scan.next().expect("batch")?;
    assert_eq!(first.rows(), 5);
    store.truncate()?;
    // Batches removed after the scan opened are skipped.
    assert!(scan.next().is_none());
    assert_eq!(store.batch_count()?, 0);
    load(&store, 0, 0..1, 5)?;
    assert_eq!(store.batch_count()?, 1);
    store.drop_store()?;
    assert!(!db.has_table("people_COLUMN_STORE_")?);
    Ok(())
}

#[test]
fn test_preferred_locations() -> Result<()> {
    let db = std::sync::Arc::new(
        crate::RowDb::in_memory()?.with_members(vec!["a".into(), "b".into(), "c".into()]),
    );
    let store = BatchStore::open(db, "people", people(), ConnMode::Embedded, 1)?;
    assert_eq!(store.preferred_locations(1), vec!["b", "c"]);
    assert!(store.preferred_locations(-1).is_empty());
    Ok(())
}
