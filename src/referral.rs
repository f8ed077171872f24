//! Referral graph primitives.
//!
//! The recommendation code is a materialized ancestor path: empty for a
//! root, otherwise `"D" + ancestor_id` segments from the top ancestor down
//! to the direct parent. A user's own full code appends their id, so the
//! subtree of a user is every row whose code starts with that full code.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::AppError;

/// Root invite sentinel: md5("dhbmachinefirst"). Registering with this code
/// bypasses the parent lookup and creates a forest root.
pub const ROOT_INVITE_CODE: &str = "abf00dd52c08a9213f225827bc3fb100";

/// A decoded invite code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteCode {
    Root,
    Parent(i64),
}

/// Decode a base64 invite code into the root sentinel or a parent user id.
pub fn decode_invite_code(code: &str) -> Result<InviteCode, AppError> {
    let bytes = BASE64
        .decode(code.trim())
        .map_err(|_| AppError::InvalidInput("invalid referral code".to_string()))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| AppError::InvalidInput("invalid referral code".to_string()))?;
    if decoded == ROOT_INVITE_CODE {
        return Ok(InviteCode::Root);
    }
    let id = decoded
        .strip_prefix('D')
        .and_then(|rest| rest.parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::InvalidInput("invalid referral code".to_string()))?;
    Ok(InviteCode::Parent(id))
}

/// The shareable invite code for a user: base64 of `"D" + user_id`.
pub fn invite_code_for(user_id: i64) -> String {
    BASE64.encode(format!("D{user_id}"))
}

/// Compose a child's recommendation code from its parent's row.
pub fn child_code(parent_code: &str, parent_id: i64) -> String {
    format!("{parent_code}D{parent_id}")
}

/// A user's own full code: their ancestor path plus their own id.
pub fn full_code(recommend_code: &str, user_id: i64) -> String {
    format!("{recommend_code}D{user_id}")
}

/// The direct recommender: the integer after the last `D` of my own
/// ancestor path. `None` for forest roots.
pub fn direct_recommender(recommend_code: &str) -> Option<i64> {
    let tail = recommend_code.rsplit('D').next()?;
    tail.parse::<i64>().ok().filter(|id| *id > 0)
}

/// Every ancestor id on the path, top ancestor first.
pub fn ancestor_ids(recommend_code: &str) -> Vec<i64> {
    recommend_code
        .split('D')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

/// Every ancestor prefix of a full code, shortest first. These are the
/// `user_recommend_area` keys whose subtree counters a new registration
/// increments.
pub fn ancestor_prefixes(full_code: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let bytes = full_code.as_bytes();
    for i in 1..bytes.len() {
        if bytes[i] == b'D' {
            prefixes.push(full_code[..i].to_string());
        }
    }
    prefixes
}

/// VIP tier for a cumulative direct-referral count, given the five
/// configured thresholds (ascending).
pub fn vip_for(history_recommend: i64, thresholds: &[i64; 5]) -> i64 {
    let mut vip = 0;
    for (i, t) in thresholds.iter().enumerate() {
        if history_recommend >= *t {
            vip = i as i64 + 1;
        }
    }
    vip
}

/// Default VIP thresholds: >=2 -> 1, >=4 -> 2, >=6 -> 3, >=8 -> 4, >=10 -> 5.
pub const DEFAULT_VIP_THRESHOLDS: [i64; 5] = [2, 4, 6, 8, 10];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_code_roundtrip() {
        let code = invite_code_for(42);
        assert_eq!(decode_invite_code(&code).unwrap(), InviteCode::Parent(42));
    }

    #[test]
    fn test_root_sentinel() {
        let encoded = BASE64.encode(ROOT_INVITE_CODE);
        assert_eq!(decode_invite_code(&encoded).unwrap(), InviteCode::Root);
    }

    #[test]
    fn test_bad_invite_codes() {
        assert!(decode_invite_code("").is_err());
        assert!(decode_invite_code("!!!").is_err());
        assert!(decode_invite_code(&BASE64.encode("X17")).is_err());
        assert!(decode_invite_code(&BASE64.encode("D0")).is_err());
        assert!(decode_invite_code(&BASE64.encode("D-3")).is_err());
    }

    #[test]
    fn test_code_composition() {
        // Root user 1, child 5, grandchild 9
        let root_code = "";
        let child = child_code(root_code, 1);
        assert_eq!(child, "D1");
        let grandchild = child_code(&child, 5);
        assert_eq!(grandchild, "D1D5");
        assert_eq!(full_code(&grandchild, 9), "D1D5D9");
    }

    #[test]
    fn test_direct_recommender() {
        assert_eq!(direct_recommender(""), None);
        assert_eq!(direct_recommender("D1"), Some(1));
        assert_eq!(direct_recommender("D1D5D9"), Some(9));
    }

    #[test]
    fn test_ancestor_ids_acyclic_shape() {
        assert_eq!(ancestor_ids("D1D5D9"), vec![1, 5, 9]);
        assert!(ancestor_ids("").is_empty());
    }

    #[test]
    fn test_ancestor_prefixes() {
        assert_eq!(
            ancestor_prefixes("D1D5D9"),
            vec!["D1".to_string(), "D1D5".to_string()]
        );
        assert!(ancestor_prefixes("D1").is_empty());
    }

    #[test]
    fn test_vip_derivation_is_pure() {
        let t = DEFAULT_VIP_THRESHOLDS;
        assert_eq!(vip_for(0, &t), 0);
        assert_eq!(vip_for(1, &t), 0);
        assert_eq!(vip_for(2, &t), 1);
        assert_eq!(vip_for(3, &t), 1);
        assert_eq!(vip_for(4, &t), 2);
        assert_eq!(vip_for(6, &t), 3);
        assert_eq!(vip_for(8, &t), 4);
        assert_eq!(vip_for(10, &t), 5);
        assert_eq!(vip_for(500, &t), 5);
    }
}
