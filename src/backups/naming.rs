use chrono::{DateTime, Utc};
use uuid::Uuid;

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Opaque backup id: 32 lowercase hex characters
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 16 hex characters that keep two uploads in the same second apart
pub fn short_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(16);
    token
}

/// Split the last path segment of `file_name` into stem and extension.
///
/// The extension starts at the final dot of the segment, so `db.tar.gz`
/// yields `(db.tar, .gz)` and a name without a dot has no extension.
fn split_name(file_name: &str) -> (&str, &str) {
    let base = match file_name.rfind('/') {
        Some(pos) => &file_name[pos + 1..],
        None => file_name,
    };
    match base.rfind('.') {
        Some(pos) => (&base[..pos], &base[pos..]),
        None => (base, ""),
    }
}

/// Blob store key for a new upload:
/// `<project>/<stem>.<YYYYMMDD.HHMMSS>.<token><ext>`
pub fn storage_key(project_id: &str, file_name: &str, now: DateTime<Utc>) -> String {
    storage_key_with_token(project_id, file_name, now, &short_token())
}

pub(crate) fn storage_key_with_token(
    project_id: &str,
    file_name: &str,
    now: DateTime<Utc>,
    token: &str,
) -> String {
    let (stem, ext) = split_name(file_name);
    let stem: String = stem.chars().filter(|c| is_slug_char(*c)).collect();
    format!(
        "{}/{}.{}.{}{}",
        project_id,
        stem,
        now.format("%Y%m%d.%H%M%S"),
        token,
        ext
    )
}

/// Trim, lowercase and drop everything outside `[a-z0-9_-]`
pub fn normalize_project_id(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| is_slug_char(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn storage_key_keeps_last_extension_and_sanitizes_stem() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 7, 5, 9).unwrap();
        let key = storage_key_with_token("alpha", "dumps/my db (1).tar.gz", now, "0123456789abcdef");
        assert_eq!(key, "alpha/mydb1tar.20240301.070509.0123456789abcdef.gz");
    }

    #[test]
    fn storage_key_without_extension() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let key = storage_key_with_token("alpha", "snapshot", now, "t");
        assert_eq!(key, "alpha/snapshot.20241231.235959.t");
    }

    #[test]
    fn dotfile_is_all_extension() {
        assert_eq!(split_name(".env"), ("", ".env"));
        assert_eq!(split_name("a/b/c.sql"), ("c", ".sql"));
    }

    #[test]
    fn tokens_have_expected_shape() {
        let id = generate_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        let token = short_token();
        assert_eq!(token.len(), 16);
        assert_ne!(short_token(), short_token());
    }

    #[test]
    fn project_ids_are_normalized() {
        assert_eq!(normalize_project_id("  My Project_1 "), "myproject_1");
        assert_eq!(normalize_project_id("billing-API"), "billing-api");
        assert_eq!(normalize_project_id(" !!! "), "");
    }
}
