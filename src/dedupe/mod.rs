//! Duplicate-account detection.
//!
//! Accounts for the same person accumulate when sign-in paths disagree
//! (federated uid vs. plain email vs. a hand-typed username). Grouping runs
//! three passes in strict order; a user claimed by an earlier pass is
//! invisible to later ones:
//!
//! 1. identical non-empty `firebase_uid`;
//! 2. identical normalized email;
//! 3. identical lowercased username, only for users with neither a
//!    federated uid nor an extractable email.
//!
//! Each group elects a keeper by completeness score, ties going to the
//! lowest (oldest) id. The merge itself lives in [`merge`].

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use crate::types::User;

pub mod merge;

pub use merge::{
    CleanupAction, CleanupOptions, CleanupOutcome, CleanupReport, MergeReport, MergeStep,
    MergeStepError,
};

// ============================================================================
// Email normalization
// ============================================================================

/// Canonical form of an address for duplicate matching, `None` when no
/// address can be extracted.
///
/// Lowercase + trim; a `+tag` suffix is stripped from the local part for
/// every domain. For gmail.com/googlemail.com, dots in the local part are
/// removed and the domain canonicalizes to gmail.com.
pub fn normalize_email(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let (local, domain) = lowered.split_once('@')?;
    let local = local.split('+').next().unwrap_or(local);
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    if domain == "gmail.com" || domain == "googlemail.com" {
        let local = local.replace('.', "");
        if local.is_empty() {
            return None;
        }
        Some(format!("{local}@gmail.com"))
    } else {
        Some(format!("{local}@{domain}"))
    }
}

// ============================================================================
// Keeper scoring
// ============================================================================

/// Higher is more complete: federated uid dominates, then username, then
/// email.
pub fn completeness_score(user: &User) -> i32 {
    let mut score = 0;
    if user
        .firebase_uid
        .as_deref()
        .is_some_and(|u| !u.trim().is_empty())
    {
        score += 100;
    }
    if !user.username.trim().is_empty() {
        score += 10;
    }
    if !user.email.trim().is_empty() {
        score += 1;
    }
    score
}

// ============================================================================
// Grouping
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    FirebaseUid,
    Email,
    Username,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub keep_id: i64,
    /// Ascending; never contains `keep_id`.
    pub duplicate_ids: Vec<i64>,
    pub matched_by: MatchRule,
}

pub fn find_duplicate_groups(users: &[User]) -> Vec<DuplicateGroup> {
    let mut groups = Vec::new();
    let mut claimed: HashSet<i64> = HashSet::new();

    // Pass 1: federated uid.
    let mut by_uid: BTreeMap<String, Vec<&User>> = BTreeMap::new();
    for user in users {
        if let Some(uid) = user.firebase_uid.as_deref() {
            let uid = uid.trim();
            if !uid.is_empty() {
                by_uid.entry(uid.to_string()).or_default().push(user);
            }
        }
    }
    collect_groups(&mut groups, &mut claimed, by_uid, MatchRule::FirebaseUid);

    // Pass 2: normalized email, unclaimed users only.
    let mut by_email: BTreeMap<String, Vec<&User>> = BTreeMap::new();
    for user in users {
        if claimed.contains(&user.user_id) {
            continue;
        }
        if let Some(email) = normalize_email(&user.email) {
            by_email.entry(email).or_default().push(user);
        }
    }
    collect_groups(&mut groups, &mut claimed, by_email, MatchRule::Email);

    // Pass 3: username, only for users with no uid and no extractable email.
    let mut by_username: BTreeMap<String, Vec<&User>> = BTreeMap::new();
    for user in users {
        if claimed.contains(&user.user_id) {
            continue;
        }
        let has_uid = user
            .firebase_uid
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if has_uid || normalize_email(&user.email).is_some() {
            continue;
        }
        let username = user.username.trim().to_lowercase();
        if !username.is_empty() {
            by_username.entry(username).or_default().push(user);
        }
    }
    collect_groups(&mut groups, &mut claimed, by_username, MatchRule::Username);

    groups
}

fn collect_groups(
    groups: &mut Vec<DuplicateGroup>,
    claimed: &mut HashSet<i64>,
    buckets: BTreeMap<String, Vec<&User>>,
    rule: MatchRule,
) {
    for (_, members) in buckets {
        if members.len() < 2 {
            continue;
        }
        let Some(keeper) = members
            .iter()
            .max_by_key(|u| (completeness_score(u), Reverse(u.user_id)))
        else {
            continue;
        };
        let mut duplicate_ids: Vec<i64> = members
            .iter()
            .map(|u| u.user_id)
            .filter(|id| *id != keeper.user_id)
            .collect();
        duplicate_ids.sort_unstable();
        for member in &members {
            claimed.insert(member.user_id);
        }
        groups.push(DuplicateGroup {
            keep_id: keeper.user_id,
            duplicate_ids,
            matched_by: rule,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
