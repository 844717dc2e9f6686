/// Maps buckets onto the members holding their copies. The primary copy
/// of bucket `b` lives on member `b mod n`; its `redundancy` secondary
/// copies follow on the next members in order. This is a locality hint
/// only: every member can serve every bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    members: Vec<String>,
    redundancy: usize,
}

impl Placement {
    pub fn new(members: Vec<String>, redundancy: usize) -> Self {
        Placement {
            members,
            redundancy,
        }
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Primary member first, then secondaries. Empty for a negative
    /// bucket or when no members are known.
    pub fn preferred_locations(&self, bucket: i32) -> Vec<String> {
        let n = self.members.len();
        if bucket < 0 || n == 0 {
            return Vec::new();
        }
        let copies = (self.redundancy + 1).min(n);
        (0..copies)
            .map(|i| self.members[(bucket as usize + i) % n].clone())
            .collect()
    }
}
