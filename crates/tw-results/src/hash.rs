//! Content hash of a resolved case.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// SHA-256 over the resolved case tree and the solver version, hex encoded.
/// Key order is part of the input, so the same file always hashes the same.
pub fn compute_case_hash(case: &Map<String, Value>, solver_version: &str) -> String {
    let mut hasher = Sha256::new();

    let case_json = serde_json::to_string(case).unwrap_or_default();
    hasher.update(case_json.as_bytes());
    hasher.update(solver_version.as_bytes());

    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(iter_count: u64) -> Map<String, Value> {
        json!({"solution": {"iter_count": iter_count}, "caseFilename": "caseA"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn hash_stability() {
        assert_eq!(compute_case_hash(&case(5), "24.2.0"), compute_case_hash(&case(5), "24.2.0"));
        assert_eq!(compute_case_hash(&case(5), "24.2.0").len(), 64);
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        assert_ne!(compute_case_hash(&case(5), "24.2.0"), compute_case_hash(&case(6), "24.2.0"));
        assert_ne!(compute_case_hash(&case(5), "24.2.0"), compute_case_hash(&case(5), "23.1.0"));
    }
}
