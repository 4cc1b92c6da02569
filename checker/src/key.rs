//! Product key and region normalization.
//!
//! The operator may type a key in any shape (lowercase, spaces, missing or
//! misplaced dashes). Everything that is displayed or submitted goes through
//! [`format_key`] first.

const GROUP_LEN: usize = 5;
const WELL_FORMED_LEN: usize = 25;
const REGION_LEN: usize = 2;

// Characters that appear in retail product keys.
const KEY_ALPHABET: &str = "ABCDEFGHJKMNPQRTUVWXY2346789";

/// Strips everything except ASCII letters and digits.
pub fn cleaned_key(input: &str) -> String {
    input.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Uppercases the key and joins it in dash-separated groups of five.
///
/// Keys of five characters or fewer come back uppercased without dashes.
pub fn format_key(input: &str) -> String {
    let cleaned = cleaned_key(input).to_ascii_uppercase();
    if cleaned.len() <= GROUP_LEN {
        return cleaned;
    }

    let mut formatted = String::with_capacity(cleaned.len() + cleaned.len() / GROUP_LEN);
    for (i, ch) in cleaned.chars().enumerate() {
        if i > 0 && i % GROUP_LEN == 0 {
            formatted.push('-');
        }
        formatted.push(ch);
    }
    formatted
}

/// Uppercased region code of at most two characters, or `None` if blank.
pub fn normalize_region(input: &str) -> Option<String> {
    let region: String = input
        .trim()
        .chars()
        .take(REGION_LEN)
        .collect::<String>()
        .to_ascii_uppercase();

    if region.is_empty() { None } else { Some(region) }
}

/// A key in its normalized, submittable form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductKey(String);

impl ProductKey {
    /// Returns `None` when the input holds no letters or digits at all.
    pub fn parse(input: &str) -> Option<Self> {
        let formatted = format_key(input.trim());
        if formatted.is_empty() {
            None
        } else {
            Some(ProductKey(formatted))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Alphanumeric form used when synthesizing job identifiers.
    pub fn cleaned(&self) -> String {
        cleaned_key(&self.0)
    }

    /// Whether the key looks like a 25-character retail key. Informational
    /// only: malformed keys are still submitted and the backend decides.
    pub fn is_well_formed(&self) -> bool {
        let cleaned = self.cleaned();
        cleaned.len() == WELL_FORMED_LEN && cleaned.chars().all(|c| KEY_ALPHABET.contains(c))
    }
}

impl std::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_key_groups_of_five() {
        assert_eq!(format_key("ABCDE12345FGHIJ"), "ABCDE-12345-FGHIJ");
        assert_eq!(format_key("abcde12345fghij"), "ABCDE-12345-FGHIJ");
        assert_eq!(format_key("abcde-12345-fghij-k"), "ABCDE-12345-FGHIJ-K");
        assert_eq!(
            format_key("aaaaa bbbbb ccccc ddddd eeeee"),
            "AAAAA-BBBBB-CCCCC-DDDDD-EEEEE"
        );
    }

    #[test]
    fn test_format_key_short_input() {
        assert_eq!(format_key(""), "");
        assert_eq!(format_key("ab-c"), "ABC");
        assert_eq!(format_key("abcde"), "ABCDE");
        assert_eq!(format_key("abcdef"), "ABCDE-F");
    }

    #[test]
    fn test_format_key_is_idempotent() {
        let once = format_key("xxxxx-yyyyy-zzzzz");
        assert_eq!(format_key(&once), once);
    }

    #[test]
    fn test_normalize_region() {
        assert_eq!(normalize_region("us"), Some("US".to_string()));
        assert_eq!(normalize_region(" ind "), Some("IN".to_string()));
        assert_eq!(normalize_region("   "), None);
        assert_eq!(normalize_region(""), None);
    }

    #[test]
    fn test_product_key() {
        assert_eq!(ProductKey::parse("  "), None);
        assert_eq!(ProductKey::parse("--"), None);

        let key = ProductKey::parse("aaaaa-bbbbb-ccccc-ddddd-eeeee").unwrap();
        assert_eq!(key.as_str(), "AAAAA-BBBBB-CCCCC-DDDDD-EEEEE");
        assert_eq!(key.cleaned(), "AAAAABBBBBCCCCCDDDDDEEEEE");
        assert!(key.is_well_formed());

        // 'O', 'I', 'L', 'S' and 'Z' never appear in retail keys.
        let key = ProductKey::parse("OOOOO-IIIII-LLLLL-SSSSS-ZZZZZ").unwrap();
        assert!(!key.is_well_formed());

        let short = ProductKey::parse("ABCDE12345FGHIJ").unwrap();
        assert!(!short.is_well_formed());
    }
}
