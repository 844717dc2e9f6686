use crate::Placement;
use test_log::test;

fn members(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("m{}", i)).collect()
}

#[test]
fn test_primary_then_secondaries() {
    let p = Placement::new(members(3), 1);
    assert_eq!(p.preferred_locations(0), vec!["m0", "m1"]);
    assert_eq!(p.preferred_locations(2), vec!["m2", "m0"]);
    assert_eq!(p.preferred_locations(4), vec!["m1", "m2"]);
}

#[test]
fn test_redundancy_capped_by_members() {
    let p = Placement::new(members(2), 5);
    assert_eq!(p.preferred_locations(1), vec!["m1", "m0"]);
    let p = Placement::new(members(1), 0);
    assert_eq!(p.preferred_locations(9), vec!["m0"]);
}

#[test]
fn test_no_location() {
    assert!(Placement::new(members(3), 1).preferred_locations(-1).is_empty());
    assert!(Placement::new(Vec::new(), 1).preferred_locations(0).is_empty());
}
