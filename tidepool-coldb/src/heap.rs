// Past this size the heap stops looking for an existing copy of a new
// entry and just appends it.
const DEDUP_LIMIT: usize = 64 * 1024;

#[derive(Debug, Default)]
pub(crate) struct Heap {
    pub(crate) data: Vec<u8>,
}

impl Heap {
    pub(crate) fn add(&mut self, new_data: &[u8]) -> usize {
        // This is quadratic as the heap grows, hence the limit.
        if self.data.len() <= DEDUP_LIMIT {
            if let Some(pos) = memchr::memmem::find(&self.data, new_data) {
                return pos;
            }
        }
        let pos = self.data.len();
        self.data.extend_from_slice(new_data);
        pos
    }

    pub(crate) fn get(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.data.get(offset..offset.checked_add(len)?)
    }
}
