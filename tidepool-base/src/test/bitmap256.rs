use crate::{chunked_bitmaps, chunked_get, Bitmap256};
use test_log::test;

#[test]
fn test_set_get_count() {
    let mut bm = Bitmap256::new();
    assert!(bm.is_empty());
    for i in (0..256).step_by(3) {
        bm.set(i, true);
    }
    assert_eq!(bm.count(), 86);
    assert!(bm.get(255));
    assert!(!bm.get(254));
    bm.set(255, false);
    assert!(!bm.get(255));
    assert!(bm.any());
}

#[test]
fn test_chunked() {
    let mut state = 1234_u32;

    fn lcg_rand_step(state: &mut u32) {
        *state = (*state as u64 * 279470273u64 % 0xfffffffb) as u32;
    }

    let mut flags = Vec::new();
    for _ in 0..700 {
        lcg_rand_step(&mut state);
        flags.push(state & 1 == 1);
    }
    let maps = chunked_bitmaps(flags.iter().copied());
    assert_eq!(maps.len(), 3);
    for (i, flag) in flags.iter().enumerate() {
        assert_eq!(chunked_get(&maps, i), *flag);
    }
    assert!(!chunked_get(&maps, 5000));
    assert!(chunked_bitmaps(std::iter::empty()).is_empty());
}
