//! Species name normalization
//!
//! Detection devices report species names as free text. Matching against
//! cataloged common names goes through [`normalize`] on both sides.

/// Canonical form of a species name: surrounding whitespace trimmed, lowercased.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Northern Cardinal \t"), "northern cardinal");
    }

    #[test]
    fn test_normalize_empty_and_blank() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_normalize_keeps_inner_whitespace() {
        // Only the ends are trimmed
        assert_eq!(normalize("Black-capped  Chickadee"), "black-capped  chickadee");
    }

    #[test]
    fn test_normalize_non_ascii() {
        assert_eq!(normalize("ÉTOURNEAU"), "étourneau");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(" American Robin ");
        assert_eq!(normalize(&once), once);
    }
}
