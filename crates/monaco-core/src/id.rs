//! Deterministic identifiers for idempotent upserts.
//!
//! Every identifier here is a pure function of its inputs so that repeated
//! deployments of the same config address the same remote object.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::Coordinate;

/// Prefix of every generated external ID.
pub const EXTERNAL_ID_PREFIX: &str = "monaco:";

/// Upper bound the platform accepts for external IDs.
pub const EXTERNAL_ID_MAX_LEN: usize = 500;

const SEPARATOR: char = '$';
const DIGEST_MARKER: char = '#';

/// Namespace for coordinate-derived UUIDs. Changing it re-keys every deployed object.
const COORDINATE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_9a3e_52d4_4b8f_a1e7_3c90_d2b4_7e15);

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 100;
const BUCKET_DIGEST_LEN: usize = 12;

/// Derive a stable external ID from a namespace (e.g. a schema ID) and a local ID.
///
/// Both parts are hex encoded and joined with `$`. When the result would exceed
/// [`EXTERNAL_ID_MAX_LEN`], every part whose encoding is longer than its even share of
/// the budget is replaced by `#` followed by the hex SHA-256 of the part, so two long
/// namespaces sharing a prefix still produce different IDs.
pub fn generate_external_id(namespace: &str, local_id: &str) -> String {
    let namespace_enc = hex::encode(namespace);
    let local_enc = hex::encode(local_id);

    let naive_len = EXTERNAL_ID_PREFIX.len() + namespace_enc.len() + 1 + local_enc.len();
    if naive_len <= EXTERNAL_ID_MAX_LEN {
        return format!("{EXTERNAL_ID_PREFIX}{namespace_enc}{SEPARATOR}{local_enc}");
    }

    let budget = (EXTERNAL_ID_MAX_LEN - EXTERNAL_ID_PREFIX.len() - 1) / 2;
    let shorten = |part: &str, encoded: String| {
        if encoded.len() > budget {
            format!("{DIGEST_MARKER}{}", hex::encode(Sha256::digest(part.as_bytes())))
        } else {
            encoded
        }
    };

    format!(
        "{EXTERNAL_ID_PREFIX}{}{SEPARATOR}{}",
        shorten(namespace, namespace_enc),
        shorten(local_id, local_enc)
    )
}

/// Stable UUID for a coordinate.
pub fn uuid_from_coordinate(coordinate: &Coordinate) -> Uuid {
    Uuid::new_v5(&COORDINATE_NAMESPACE, coordinate.to_string().as_bytes())
}

/// Whether `id` has the shape of a coordinate-derived UUID (version 5).
///
/// Such objects were claimed by some config and are never adopted by another one.
pub fn is_coordinate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok_and(|uuid| uuid.get_version_num() == 5)
}

/// Deterministic bucket name for a coordinate.
///
/// Bucket names are limited to `[a-z0-9_-]`, must start with a letter and be
/// 3 to 100 characters long. Any lossy conversion appends a short digest of the
/// original so distinct coordinates keep distinct names.
pub fn bucket_name(coordinate: &Coordinate) -> String {
    let raw = format!("{}_{}", coordinate.project, coordinate.config_id);

    let mut name: String = raw
        .chars()
        .map(|ch| {
            let ch = ch.to_ascii_lowercase();
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if !name.starts_with(|ch: char| ch.is_ascii_lowercase()) {
        name.insert_str(0, "b_");
    }

    if name != raw || name.len() > BUCKET_NAME_MAX_LEN || name.len() < BUCKET_NAME_MIN_LEN {
        let digest = hex::encode(Sha256::digest(raw.as_bytes()));
        let suffix = &digest[..BUCKET_DIGEST_LEN];
        name.truncate(BUCKET_NAME_MAX_LEN - BUCKET_DIGEST_LEN - 1);
        name.push('_');
        name.push_str(suffix);
    }

    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_id_is_deterministic() {
        assert_eq!(generate_external_id("a", "b"), generate_external_id("a", "b"));
    }

    #[test]
    fn test_external_id_discriminates() {
        let aa = generate_external_id("a", "a");
        let ab = generate_external_id("a", "b");
        let bb = generate_external_id("b", "b");
        assert_ne!(aa, ab);
        assert_ne!(ab, bb);
        assert_ne!(aa, bb);
    }

    #[test]
    fn test_external_id_separator_is_unambiguous() {
        assert_ne!(
            generate_external_id("a$", "b"),
            generate_external_id("a", "$b")
        );
    }

    #[test]
    fn test_external_id_prefix() {
        assert!(generate_external_id("", "").starts_with(EXTERNAL_ID_PREFIX));
        assert!(generate_external_id("builtin:alerting.profile", "x").starts_with("monaco:"));
    }

    #[test]
    fn test_external_id_bounded_for_long_inputs() {
        let long = "n".repeat(502);
        let cases = [
            generate_external_id(&long, "id"),
            generate_external_id("ns", &long),
            generate_external_id(&long, &long),
        ];
        for id in &cases {
            assert!(id.len() <= EXTERNAL_ID_MAX_LEN, "{} chars", id.len());
            assert!(id.starts_with(EXTERNAL_ID_PREFIX));
        }
    }

    #[test]
    fn test_long_namespaces_sharing_prefix_differ() {
        let prefix = "x".repeat(600);
        let a = generate_external_id(&format!("{prefix}a"), "id");
        let b = generate_external_id(&format!("{prefix}b"), "id");
        assert_ne!(a, b);
    }

    #[test]
    fn test_uuid_from_coordinate() {
        let a = Coordinate::new("p", "dashboard", "a");
        let b = Coordinate::new("p", "dashboard", "b");
        assert_eq!(uuid_from_coordinate(&a), uuid_from_coordinate(&a));
        assert_ne!(uuid_from_coordinate(&a), uuid_from_coordinate(&b));
    }

    #[test]
    fn test_coordinate_uuid_is_recognised() {
        let derived = uuid_from_coordinate(&Coordinate::new("p", "dashboard", "a"));
        assert!(is_coordinate_uuid(&derived.to_string()));
        assert!(!is_coordinate_uuid(&Uuid::new_v4().to_string()));
        assert!(!is_coordinate_uuid("dashboard-1234"));
    }

    #[test]
    fn test_bucket_name_plain() {
        let c = Coordinate::new("logs", "bucket", "retention_30");
        assert_eq!(bucket_name(&c), "logs_retention_30");
    }

    #[test]
    fn test_bucket_name_sanitized() {
        let upper = bucket_name(&Coordinate::new("Logs", "bucket", "a.b"));
        assert!(upper.starts_with("logs_a_b_"));
        assert!(upper.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));

        let digit = bucket_name(&Coordinate::new("1p", "bucket", "x"));
        assert!(digit.starts_with("b_1p_x"));

        let other = bucket_name(&Coordinate::new("logs", "bucket", "a b"));
        assert_ne!(bucket_name(&Coordinate::new("logs", "bucket", "a.b")), other);
    }

    #[test]
    fn test_bucket_name_length_bounds() {
        let long = bucket_name(&Coordinate::new("p", "bucket", &"x".repeat(300)));
        assert_eq!(long.len(), BUCKET_NAME_MAX_LEN);

        let short = bucket_name(&Coordinate::new("a", "bucket", ""));
        assert!(short.len() >= BUCKET_NAME_MIN_LEN);
    }
}
