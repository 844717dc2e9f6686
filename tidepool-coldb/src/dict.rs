use std::collections::BTreeMap;

// Returns the sorted distinct values and, per input row, the index of
// its value in that sorted list.
pub(crate) fn dict_encode<T: Ord>(vals: &[T]) -> (Vec<&T>, Vec<i64>) {
    let mut dict = vals
        .iter()
        .map(|x| (x, 0_i64))
        .collect::<BTreeMap<&T, i64>>();
    let values = dict.keys().copied().collect::<Vec<&T>>();
    for (i, code) in dict.values_mut().enumerate() {
        *code = i as i64;
    }
    let codes = vals.iter().map(|v| dict[v]).collect();
    (values, codes)
}

// Collapses runs of equal values. `run_ends[i]` is the exclusive end row
// of the run holding `run_vals[i]`.
pub(crate) fn run_end_encode<T: Eq>(vals: &[T]) -> (Vec<&T>, Vec<i64>) {
    let mut run_vals = Vec::new();
    let mut run_ends = Vec::new();
    for (i, val) in vals.iter().enumerate() {
        match run_vals.last() {
            Some(prev) if *prev == val => {
                if let Some(end) = run_ends.last_mut() {
                    *end = i as i64 + 1;
                }
            }
            _ => {
                run_vals.push(val);
                run_ends.push(i as i64 + 1);
            }
        }
    }
    (run_vals, run_ends)
}

pub(crate) fn run_end_decode<T: Clone>(run_vals: &[T], run_ends: &[i64], rows: usize) -> Option<Vec<T>> {
    if run_vals.len() != run_ends.len() {
        return None;
    }
    let mut out = Vec::with_capacity(rows);
    for (val, &end) in run_vals.iter().zip(run_ends) {
        let end = usize::try_from(end).ok()?;
        if end <= out.len() || end > rows {
            return None;
        }
        out.resize(end, val.clone());
    }
    (out.len() == rows).then_some(out)
}
