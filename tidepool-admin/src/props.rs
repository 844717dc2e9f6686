use std::collections::BTreeMap;
use tidepool_base::{err_kind, ErrorKind, Result};

pub type Props = BTreeMap<String, String>;

/// Upper-cases keys and trims values. Keys naming the same property in
/// different cases are an error, as is any key outside `known`.
pub fn canonicalize<K, V>(props: impl IntoIterator<Item = (K, V)>, known: &[&str]) -> Result<Props>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = Props::new();
    for (k, v) in props {
        let key = k.as_ref().trim().to_ascii_uppercase();
        if !known.contains(&key.as_str()) {
            return Err(err_kind(
                ErrorKind::Config,
                format!("unknown property '{}'", k.as_ref()),
            ));
        }
        if out.insert(key, v.as_ref().trim().to_string()).is_some() {
            return Err(err_kind(
                ErrorKind::Config,
                format!("property '{}' given more than once", k.as_ref()),
            ));
        }
    }
    Ok(out)
}

pub(crate) fn parse_num<T: std::str::FromStr>(props: &Props, key: &str, default: T) -> Result<T> {
    match props.get(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| {
            err_kind(
                ErrorKind::Config,
                format!("{} must be a non-negative integer, got '{}'", key, v),
            )
        }),
    }
}

// Comma-separated names; blanks around names are dropped.
pub(crate) fn parse_list(props: &Props, key: &str) -> Result<Vec<String>> {
    let v = match props.get(key) {
        None => return Ok(Vec::new()),
        Some(v) if v.is_empty() => return Ok(Vec::new()),
        Some(v) => v,
    };
    v.split(',')
        .map(|s| {
            let s = s.trim();
            if s.is_empty() {
                Err(err_kind(
                    ErrorKind::Config,
                    format!("{} has an empty entry: '{}'", key, v),
                ))
            } else {
                Ok(s.to_string())
            }
        })
        .collect()
}
