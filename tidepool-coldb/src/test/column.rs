use crate::column::{decode_column, ColumnEncoder, Vals};
use test_log::test;
use tidepool_base::{ErrorKind, Result};
use tidepool_lang::{Ty, Val};

fn seal_and_decode(ty: Ty, vals: &[Val], compress: bool) -> Result<(Vec<u8>, Vec<Val>)> {
    let mut enc = ColumnEncoder::new(ty);
    for v in vals {
        enc.append(v)?;
    }
    let (buf, stats) = enc.seal(compress)?;
    assert_eq!(enc.rows(), 0);
    assert_eq!(stats.nulls as usize, vals.iter().filter(|v| v.is_nil()).count());
    let col = decode_column(ty, &buf)?;
    assert_eq!(col.len(), vals.len());
    Ok((buf, col.iter().collect()))
}

#[test]
fn test_round_trip_all_types() -> Result<()> {
    let cases: Vec<(Ty, Vec<Val>)> = vec![
        (Ty::Bit, vec![true.into(), Val::Nil, false.into(), true.into()]),
        (Ty::Int, vec![Val::Int(5), Val::Int(-3), Val::Nil, Val::Int(i64::MAX), Val::Int(i64::MIN)]),
        (Ty::Flo, vec![Val::flo(1.5), Val::Nil, Val::flo(-0.25), Val::flo(f64::INFINITY)]),
        (Ty::Str, vec!["abc".into(), "".into(), Val::Nil, "héllo".into(), "abc".into()]),
        (
            Ty::Dec { precision: 12, scale: 4 },
            vec![Val::Dec(123_4567), Val::Dec(-1), Val::Nil, Val::Dec(0)],
        ),
    ];
    for compress in [false, true] {
        for (ty, vals) in cases.iter() {
            let (_, back) = seal_and_decode(*ty, vals, compress)?;
            assert_eq!(&back, vals, "{:?} compress={}", ty, compress);
        }
    }
    Ok(())
}

#[test]
fn test_all_null_column() -> Result<()> {
    let vals = vec![Val::Nil; 300];
    let mut enc = ColumnEncoder::new(Ty::Str);
    for v in vals.iter() {
        enc.append(v)?;
    }
    let (buf, stats) = enc.seal(true)?;
    assert_eq!(stats.nulls, 300);
    assert!(stats.lo.is_nil() && stats.hi.is_nil());
    let col = decode_column(Ty::Str, &buf)?;
    assert_eq!(col.null_count(), 300);
    assert!(col.iter().all(|v| v.is_nil()));
    Ok(())
}

#[test]
fn test_repetitive_strings_use_dictionary_and_runs() -> Result<()> {
    let mut vals = Vec::new();
    for i in 0..1000 {
        vals.push(Val::str(if i < 600 { "north" } else { "south" }));
    }
    let (plain_size, back) = {
        let (buf, back) = seal_and_decode(Ty::Str, &vals, false)?;
        (buf.len(), back)
    };
    assert_eq!(back, vals);
    // Two dictionary entries and two runs; far smaller than 1000 entries.
    assert!(plain_size < 100, "size was {}", plain_size);
    Ok(())
}

#[test]
fn test_dictionary_without_runs() -> Result<()> {
    let words = ["a", "b", "c"];
    let vals = (0..90).map(|i| Val::str(words[i % 3])).collect::<Vec<Val>>();
    let (_, back) = seal_and_decode(Ty::Str, &vals, false)?;
    assert_eq!(back, vals);
    Ok(())
}

#[test]
fn test_compression_shrinks_large_columns() -> Result<()> {
    let vals = (0..5000).map(|i| Val::Int(i % 7)).collect::<Vec<Val>>();
    let (raw, _) = seal_and_decode(Ty::Int, &vals, false)?;
    let (packed, back) = seal_and_decode(Ty::Int, &vals, true)?;
    assert!(packed.len() < raw.len());
    assert_eq!(packed[0] & 1, 1);
    assert_eq!(back, vals);
    Ok(())
}

#[test]
fn test_incompressible_column_stays_raw() -> Result<()> {
    let (buf, _) = seal_and_decode(Ty::Int, &[Val::Int(42)], true)?;
    assert_eq!(buf[0], 0);
    Ok(())
}

#[test]
fn test_type_mismatch_and_corruption() -> Result<()> {
    let mut enc = ColumnEncoder::new(Ty::Int);
    let e = enc.append(&Val::str("x")).unwrap_err();
    assert!(e.is(ErrorKind::SchemaMismatch));
    let e = ColumnEncoder::new(Ty::Int).append(&Val::Dec(1)).unwrap_err();
    assert!(e.is(ErrorKind::SchemaMismatch));

    enc.append(&Val::Int(1))?;
    let (buf, _) = enc.seal(false)?;
    assert!(decode_column(Ty::Str, &buf).unwrap_err().is(ErrorKind::Corrupt));
    assert!(decode_column(Ty::Int, &buf[..buf.len() - 1]).unwrap_err().is(ErrorKind::Corrupt));
    assert!(decode_column(Ty::Int, &[]).unwrap_err().is(ErrorKind::Corrupt));
    let mut trailing = buf.clone();
    trailing.push(0);
    assert!(decode_column(Ty::Int, &trailing).unwrap_err().is(ErrorKind::Corrupt));
    Ok(())
}

#[test]
fn test_typed_lanes() -> Result<()> {
    let mut enc = ColumnEncoder::new(Ty::Dec { precision: 5, scale: 2 });
    enc.append(&Val::Dec(250))?;
    enc.append(&Val::Nil)?;
    let (buf, stats) = enc.seal(false)?;
    assert_eq!(stats.lo, Val::Dec(250));
    let col = decode_column(Ty::Dec { precision: 5, scale: 2 }, &buf)?;
    assert_eq!(col.vals(), &Vals::Ints(vec![250, 0]));
    assert!(col.is_null(1));
    assert_eq!(col.get(2), None);
    Ok(())
}
