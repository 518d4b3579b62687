use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[must_use]
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// A fresh directory path for one scenario's shared `FileStore`.
#[must_use]
pub fn temp_store_dir(root: Option<&PathBuf>, scenario: &str, seed: u64) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let base = root.cloned().unwrap_or_else(std::env::temp_dir);
    base.join(format!("escapade-{scenario}-seed-{seed}-{nanos}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" alpha, ,beta,  gamma ");
        assert_eq!(parts, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn store_dirs_are_distinct_and_labelled() {
        let a = temp_store_dir(None, "classroom", 7);
        let b = temp_store_dir(None, "classroom", 7);
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("escapade-classroom-seed-7-"));
    }
}
