use super::{mem_store, options, orders};
use crate::{
    AccessMode, BatchKey, Cmp, ColumnTable, Filter, Predicate, RelationCache, StoreConfig,
    StoreRegistry, TableKind,
};
use std::collections::BTreeSet;
use test_log::test;
use tidepool_base::{ErrorKind, Result};
use tidepool_lang::{row, Row, Val};

fn order(i: i64) -> Row {
    let region = ["eu", "us", "apac"][(i % 3) as usize];
    row![i, region, Val::Dec(i * 125)]
}

fn orders_upto(n: i64) -> Vec<Row> {
    (0..n).map(order).collect()
}

#[test]
fn test_full_batch_moves_and_empties_base() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(1, 3))?;
    let keys = t.insert(orders_upto(3))?;
    assert_eq!(keys.len(), 1);
    assert_eq!(t.batch_count()?, 1);
    assert_eq!(t.base_row_count()?, 0);
    let batch = t.scan_batches::<&str>(&[], Filter::all(), None)?.next().expect("batch")?;
    assert_eq!(batch.rows(), 3);
    assert_eq!(batch.decode_rows()?, orders_upto(3));
    Ok(())
}

#[test]
fn test_remainder_stays_in_base() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(1, 3))?;
    t.insert(orders_upto(5))?;
    assert_eq!(t.batch_count()?, 1);
    assert_eq!(t.base_row_count()?, 2);
    let mut rows = t.scan_rows::<&str>(&[], &Filter::all())?;
    assert_eq!(rows.len(), 5);
    rows.sort();
    assert_eq!(rows, orders_upto(5));

    // The base region is the oldest-first tail of the insert order.
    assert_eq!(t.scan_rows::<&str>(&[], &Filter::all())?[3..], orders_upto(5)[3..]);

    let keys = t.flush()?;
    assert_eq!(keys.len(), 1);
    assert_eq!(t.batch_count()?, 2);
    assert_eq!(t.base_row_count()?, 0);
    assert!(t.flush()?.is_empty());
    Ok(())
}

#[test]
fn test_inserts_accumulate_across_calls() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(1, 4))?;
    for i in 0..10 {
        t.insert(vec![order(i)])?;
    }
    assert_eq!(t.batch_count()?, 2);
    assert_eq!(t.base_row_count()?, 2);
    Ok(())
}

#[test]
fn test_schema_mismatch_writes_nothing() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(4, 3))?;
    let mut rows = orders_upto(5);
    rows.push(row![Val::Nil, "eu", Val::Dec(1)]);
    assert!(t.insert(rows.clone()).unwrap_err().is(ErrorKind::SchemaMismatch));
    assert!(t.load(rows).unwrap_err().is(ErrorKind::SchemaMismatch));
    assert_eq!(t.base_row_count()?, 0);
    assert_eq!(t.batch_count()?, 0);
    Ok(())
}

#[test]
fn test_load_row_count_invariant() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(8, 16))?;
    let keys = t.load(orders_upto(1000))?;
    let mut total = 0;
    let mut per_bucket = std::collections::BTreeMap::new();
    for batch in t.scan_batches::<&str>(&[], Filter::all(), None)? {
        let batch = batch?;
        assert!(batch.rows() > 0 && batch.rows() <= 16);
        total += batch.rows() as usize;
        *per_bucket.entry(batch.key().bucket).or_insert(0_usize) += batch.rows() as usize;
    }
    assert_eq!(total, 1000);
    assert_eq!(keys.len(), t.batch_count()?);
    // Each bucket holds ceil(n/16) batches for its n rows.
    let batches_by_bucket = keys.iter().fold(std::collections::BTreeMap::new(), |mut m, k| {
        *m.entry(k.bucket).or_insert(0_usize) += 1;
        m
    });
    for (bucket, n) in per_bucket {
        assert_eq!(batches_by_bucket[&bucket], (n + 15) / 16);
    }
    let mut rows = t.scan_rows::<&str>(&[], &Filter::all())?;
    rows.sort();
    assert_eq!(rows, orders_upto(1000));
    Ok(())
}

#[test]
fn test_concurrent_bucket_loads_have_unique_keys() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(16, 5))?;
    let keys = std::thread::scope(|s| {
        let handles = (0..8_i64)
            .map(|w| {
                let t = &t;
                s.spawn(move || t.load(((w * 100)..(w * 100 + 100)).map(order).collect()))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().expect("loader thread"))
            .collect::<Result<Vec<Vec<BatchKey>>>>()
    })?;
    let all = keys.into_iter().flatten().collect::<Vec<BatchKey>>();
    let uuids = all.iter().map(|k| k.uuid).collect::<BTreeSet<_>>();
    assert_eq!(uuids.len(), all.len());
    assert_eq!(t.batch_count()?, all.len());
    Ok(())
}

#[test]
fn test_scan_rows_projection_and_filter() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(2, 10))?;
    t.load(orders_upto(40))?;
    t.insert(vec![order(40), order(41)])?;
    let filter = Filter::all()
        .and(Predicate::new(0, Cmp::Ge, 30_i64))
        .and(Predicate::new(1, Cmp::Eq, "eu"));
    let mut amounts = t.scan_rows(&["amount"], &filter)?;
    amounts.sort();
    // ids 30, 33, 36, 39 from batches; nothing from the base region.
    assert_eq!(
        amounts,
        [30_i64, 33, 36, 39].iter().map(|i| row![Val::Dec(i * 125)]).collect::<Vec<_>>()
    );
    let ids = t.scan_rows(&["id"], &Filter::all().and(Predicate::new(0, Cmp::Gt, 39_i64)))?;
    assert_eq!(ids.len(), 2);
    assert!(t.scan_rows(&["missing"], &Filter::all()).unwrap_err().is(ErrorKind::SchemaMismatch));
    Ok(())
}

#[test]
fn test_bucket_scans_in_both_modes() -> Result<()> {
    for mode in [AccessMode::Embedded, AccessMode::Remote] {
        let reg = StoreRegistry::new();
        let store = reg.acquire(&StoreConfig::memory("modes").with_mode(mode))?;
        let t = ColumnTable::create(&store, "orders", orders(), options(4, 3))?;
        t.load(orders_upto(60))?;
        let target = t.bucket_of(&order(0));
        let expected = orders_upto(60)
            .into_iter()
            .filter(|r| t.bucket_of(r) == target)
            .count();
        let mut seen = 0;
        for batch in t.scan_batches(&["id"], Filter::all(), Some(&[target][..]))? {
            let batch = batch?;
            assert_eq!(batch.key().bucket, target);
            seen += batch.rows() as usize;
        }
        assert_eq!(seen, expected);
    }
    Ok(())
}

#[test]
fn test_truncate_and_drop() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(2, 4))?;
    t.insert(orders_upto(11))?;
    assert!(t.batch_count()? > 0);
    t.truncate()?;
    assert_eq!(t.batch_count()?, 0);
    assert_eq!(t.base_row_count()?, 0);
    assert!(t.scan_rows::<&str>(&[], &Filter::all())?.is_empty());

    t.insert(orders_upto(2))?;
    let reopened = ColumnTable::open(&store, "orders")?;
    assert_eq!(reopened.base_row_count()?, 2);
    reopened.drop_table()?;
    assert!(ColumnTable::open(&store, "orders").err().map(|e| e.is(ErrorKind::NotFound)).unwrap_or(false));
    let t = ColumnTable::create(&store, "orders", orders(), options(2, 4))?;
    assert_eq!(t.base_row_count()?, 0);
    Ok(())
}

#[test]
fn test_create_rules() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    ColumnTable::create(&store, "orders", orders(), options(2, 4))?;
    let dup = ColumnTable::create(&store, "orders", orders(), options(2, 4)).err();
    assert!(dup.map(|e| e.is(ErrorKind::Config)).unwrap_or(false));

    let mut bad = options(2, 4);
    bad.partition_by = vec!["nope".into()];
    assert!(ColumnTable::create(&store, "x", orders(), bad).is_err());
    assert!(!crate::TableDef::exists(store.db(), "x")?);

    let row_kind = ColumnTable::create_kind(&store, "r", orders(), options(2, 4), TableKind::Row).err();
    assert!(row_kind.map(|e| e.is(ErrorKind::Config)).unwrap_or(false));

    let sample = ColumnTable::create_kind(&store, "s", orders(), options(2, 4), TableKind::Sample)?;
    assert!(sample.insert(orders_upto(1)).unwrap_err().is(ErrorKind::Config));
    assert_eq!(sample.load(orders_upto(9))?.len(), sample.batch_count()?);
    Ok(())
}

#[test]
fn test_open_through_cache_and_placement() -> Result<()> {
    let reg = StoreRegistry::new();
    let cfg = StoreConfig::memory("placed").with_members(vec!["a".into(), "b".into(), "c".into()]);
    let store = reg.acquire(&cfg)?;
    let mut opts = options(6, 4);
    opts.redundancy = 1;
    opts.partition_by = vec!["region".into()];
    ColumnTable::create(&store, "orders", orders(), opts)?;
    let cache = RelationCache::new(store.db().clone());
    let t = ColumnTable::from_def(&store, cache.get("orders")?)?;
    assert_eq!(t.options().redundancy, 1);
    assert_eq!(t.preferred_locations(4), vec!["b", "c"]);
    assert_eq!(t.bucket_of(&order(0)), t.bucket_of(&order(3)));
    Ok(())
}

#[test]
fn test_open_tables_keep_store_registered() -> Result<()> {
    let reg = StoreRegistry::new();
    let cfg = StoreConfig::memory("held");
    let store = reg.acquire(&cfg)?;
    let t = ColumnTable::create(&store, "orders", orders(), options(2, 4))?;
    let again = ColumnTable::open(&store, "orders")?;
    assert_eq!(reg.ref_count(&cfg), 3);
    assert!(!reg.release(store)?);
    assert!(reg.is_open(&cfg));

    t.insert(orders_upto(3))?;
    let store = reg.acquire(&cfg)?;
    assert_eq!(ColumnTable::open(&store, "orders")?.base_row_count()?, 3);
    assert!(!reg.release(store)?);

    drop(t);
    assert_eq!(reg.ref_count(&cfg), 1);
    again.drop_table()?;
    assert!(!reg.is_open(&cfg));
    Ok(())
}

#[test]
fn test_two_instances_insert_into_one_bucket() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    ColumnTable::create(&store, "orders", orders(), options(1, 2))?;
    let a = ColumnTable::open(&store, "orders")?;
    let b = ColumnTable::open(&store, "orders")?;
    std::thread::scope(|s| {
        let workers = [(&a, 0_i64), (&b, 300)]
            .into_iter()
            .map(|(t, start)| {
                s.spawn(move || -> Result<()> {
                    for i in start..start + 300 {
                        t.insert(vec![order(i)])?;
                    }
                    Ok(())
                })
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .map(|w| w.join().expect("insert thread"))
            .collect::<Result<Vec<()>>>()
    })?;
    assert_eq!(a.batch_count()? * 2 + a.base_row_count()?, 600);
    assert!(b.base_row_count()? < 2);
    let mut rows = b.scan_rows::<&str>(&[], &Filter::all())?;
    rows.sort();
    assert_eq!(rows, orders_upto(600));
    Ok(())
}

#[test]
fn test_scan_rows_repeats_a_column() -> Result<()> {
    let reg = StoreRegistry::new();
    let store = mem_store(&reg, "t");
    let t = ColumnTable::create(&store, "orders", orders(), options(1, 3))?;
    t.insert(orders_upto(4))?;
    let mut rows = t.scan_rows(&["id", "id"], &Filter::all())?;
    rows.sort();
    assert_eq!(rows, (0..4_i64).map(|i| row![i, i]).collect::<Vec<_>>());
    Ok(())
}
