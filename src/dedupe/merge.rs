//! Merging one duplicate account into a keeper.
//!
//! Sub-steps run in a fixed order and each captures its own failure into the
//! returned [`MergeReport`]; a failed step never stops the ones after it.
//! Events are deliberately left alone: they stay owned by the removed id
//! rather than being reassigned, so calendar history is never rewritten by a
//! merge.

use std::collections::HashSet;

use crate::db::Db;
use crate::error::{DbError, Result};
use crate::mirror::{EntityKind, MirrorJob};
use crate::types::PrefsPatch;

use super::{find_duplicate_groups, DuplicateGroup};

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStep {
    Rsvps,
    Friends,
    Notifications,
    Preferences,
    DeleteUser,
}

#[derive(Debug, Clone)]
pub struct MergeStepError {
    pub step: MergeStep,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub keep_id: i64,
    pub remove_id: i64,
    /// True when the pair was swapped because the removal candidate held
    /// the federated uid.
    pub swapped_roles: bool,
    pub rsvps_moved: usize,
    pub friend_rows_moved: usize,
    /// Self-references and already-existing keeper friendships.
    pub friend_rows_dropped: usize,
    pub notifications_moved: usize,
    pub prefs_merged: bool,
    pub user_deleted: bool,
    pub step_errors: Vec<MergeStepError>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.step_errors.is_empty()
    }

    fn fail(&mut self, step: MergeStep, message: impl ToString) {
        self.step_errors.push(MergeStepError {
            step,
            message: message.to_string(),
        });
    }
}

// ============================================================================
// Cleanup
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupOptions {
    /// Report groups without touching anything.
    pub dry_run: bool,
    /// Merge every duplicate into its keeper.
    pub auto_merge: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CleanupAction {
    Merged,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CleanupOutcome {
    pub duplicate_id: i64,
    pub keep_id: i64,
    pub action: CleanupAction,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub groups: Vec<DuplicateGroup>,
    pub outcomes: Vec<CleanupOutcome>,
}

// ============================================================================
// Db surface
// ============================================================================

impl Db {
    /// Non-destructive scan over the whole user table.
    pub async fn find_user_duplicates(&self) -> Result<Vec<DuplicateGroup>> {
        let users = self.backend().all_users().await?;
        Ok(find_duplicate_groups(&users))
    }

    /// Fold `remove_id` into `keep_id`. Mirror consumption is paused for the
    /// duration so the remote store sees the finished merge, not its
    /// intermediate states; the prior pause state is restored afterwards.
    pub async fn merge_users(&self, keep_id: i64, remove_id: i64) -> Result<MergeReport> {
        if keep_id == remove_id {
            return Err(DbError::Internal(
                "cannot merge a user into itself".to_string(),
            ));
        }
        let keep = self
            .backend()
            .user_by_id(keep_id)
            .await?
            .ok_or_else(|| DbError::Internal(format!("merge keeper {keep_id} not found")))?;
        let remove = self
            .backend()
            .user_by_id(remove_id)
            .await?
            .ok_or_else(|| DbError::Internal(format!("merge candidate {remove_id} not found")))?;

        // The account holding the federated identity survives, whichever way
        // the caller passed the pair.
        let keep_has_uid = keep.firebase_uid.as_deref().is_some_and(|u| !u.is_empty());
        let remove_has_uid = remove
            .firebase_uid
            .as_deref()
            .is_some_and(|u| !u.is_empty());
        let (keep_id, remove_id, swapped) = if remove_has_uid && !keep_has_uid {
            (remove_id, keep_id, true)
        } else {
            (keep_id, remove_id, false)
        };

        let mut report = MergeReport {
            keep_id,
            remove_id,
            swapped_roles: swapped,
            ..Default::default()
        };

        let was_paused = self.outbox().is_paused();
        self.pause_mirroring();

        self.merge_rsvps(keep_id, remove_id, &mut report).await;
        self.merge_friends(keep_id, remove_id, &mut report).await;
        self.merge_notifications(keep_id, remove_id, &mut report)
            .await;
        self.merge_preferences(keep_id, remove_id, &mut report)
            .await;

        // The duplicate row goes last so a partial merge stays re-runnable.
        match self.backend().delete_user(remove_id).await {
            Ok(()) => {
                report.user_deleted = true;
                self.outbox().enqueue(MirrorJob::Delete {
                    entity: EntityKind::User,
                    id: remove_id,
                });
            }
            Err(e) => report.fail(MergeStep::DeleteUser, e),
        }

        self.outbox().set_paused(was_paused);
        log::info!(
            "merged user {} into {} ({} rsvps, {} friend rows, {} notifications, {} error(s))",
            remove_id,
            keep_id,
            report.rsvps_moved,
            report.friend_rows_moved,
            report.notifications_moved,
            report.step_errors.len()
        );
        Ok(report)
    }

    /// Scan, then act per `options`. Without `auto_merge` every duplicate is
    /// reported `Skipped` — unmerged deletion is intentionally not offered.
    pub async fn run_duplicate_cleanup(&self, options: CleanupOptions) -> Result<CleanupReport> {
        let groups = self.find_user_duplicates().await?;
        let mut outcomes = Vec::new();

        if !options.dry_run {
            for group in &groups {
                for &duplicate_id in &group.duplicate_ids {
                    let action = if options.auto_merge {
                        match self.merge_users(group.keep_id, duplicate_id).await {
                            Ok(r) if r.user_deleted => CleanupAction::Merged,
                            Ok(_) => {
                                CleanupAction::Failed("duplicate row not removed".to_string())
                            }
                            Err(e) => CleanupAction::Failed(e.to_string()),
                        }
                    } else {
                        CleanupAction::Skipped
                    };
                    outcomes.push(CleanupOutcome {
                        duplicate_id,
                        keep_id: group.keep_id,
                        action,
                    });
                }
            }
        }

        Ok(CleanupReport { groups, outcomes })
    }

    // -----------------------------------------------------------------------
    // Merge steps
    // -----------------------------------------------------------------------

    /// Recreate the duplicate's RSVPs under the keeper, then delete the
    /// originals. Event ids are untouched.
    async fn merge_rsvps(&self, keep_id: i64, remove_id: i64, report: &mut MergeReport) {
        let rows = match self.backend().rsvps_for_user(remove_id).await {
            Ok(rows) => rows,
            Err(e) => return report.fail(MergeStep::Rsvps, e),
        };
        for row in rows {
            let mut moved = row.clone();
            if moved.event_owner_id == remove_id {
                moved.event_owner_id = keep_id;
            }
            if moved.invite_recipient_id == remove_id {
                moved.invite_recipient_id = keep_id;
            }
            let result: Result<()> = async {
                let new_id = self.backend().insert_rsvp(&moved).await?;
                moved.rsvp_id = new_id;
                self.outbox().enqueue(MirrorJob::Upsert {
                    entity: EntityKind::Rsvp,
                    id: new_id,
                    fields: serde_json::to_value(&moved)?,
                });
                self.backend().delete_rsvp(row.rsvp_id).await?;
                self.outbox().enqueue(MirrorJob::Delete {
                    entity: EntityKind::Rsvp,
                    id: row.rsvp_id,
                });
                Ok(())
            }
            .await;
            match result {
                Ok(()) => report.rsvps_moved += 1,
                Err(e) => report.fail(MergeStep::Rsvps, e),
            }
        }
    }

    /// Recreate friend rows preserving direction and status. Rows that would
    /// self-reference the keeper, or duplicate an existing keeper
    /// relationship, are dropped instead of recreated.
    async fn merge_friends(&self, keep_id: i64, remove_id: i64, report: &mut MergeReport) {
        let keeper_rows = match self.backend().friend_rows_for_user(keep_id).await {
            Ok(rows) => rows,
            Err(e) => return report.fail(MergeStep::Friends, e),
        };
        let mut keeper_partners: HashSet<i64> = keeper_rows
            .iter()
            .map(|r| {
                if r.user_id == keep_id {
                    r.friend_id
                } else {
                    r.user_id
                }
            })
            .collect();

        let rows = match self.backend().friend_rows_for_user(remove_id).await {
            Ok(rows) => rows,
            Err(e) => return report.fail(MergeStep::Friends, e),
        };
        for row in rows {
            let other = if row.user_id == remove_id {
                row.friend_id
            } else {
                row.user_id
            };
            let recreate = other != keep_id && !keeper_partners.contains(&other);

            let result: Result<()> = async {
                if recreate {
                    let (from, to) = if row.user_id == remove_id {
                        (keep_id, row.friend_id)
                    } else {
                        (row.user_id, keep_id)
                    };
                    let new_id = self
                        .backend()
                        .insert_friend_row(from, to, row.status)
                        .await?;
                    self.outbox().enqueue(MirrorJob::Upsert {
                        entity: EntityKind::Friend,
                        id: new_id,
                        fields: serde_json::json!({
                            "friendRowId": new_id,
                            "userId": from,
                            "friendId": to,
                            "status": row.status,
                        }),
                    });
                }
                self.backend().delete_friend_row(row.friend_row_id).await?;
                self.outbox().enqueue(MirrorJob::Delete {
                    entity: EntityKind::Friend,
                    id: row.friend_row_id,
                });
                Ok(())
            }
            .await;
            match result {
                Ok(()) if recreate => {
                    keeper_partners.insert(other);
                    report.friend_rows_moved += 1;
                }
                Ok(()) => report.friend_rows_dropped += 1,
                Err(e) => report.fail(MergeStep::Friends, e),
            }
        }
    }

    async fn merge_notifications(&self, keep_id: i64, remove_id: i64, report: &mut MergeReport) {
        let rows = match self.backend().notifications_for_user(remove_id).await {
            Ok(rows) => rows,
            Err(e) => return report.fail(MergeStep::Notifications, e),
        };
        for row in rows {
            let mut moved = row;
            moved.user_id = keep_id;
            let result: Result<()> = async {
                let new_id = self.backend().insert_notification(&moved).await?;
                moved.notification_id = new_id;
                self.outbox().enqueue(MirrorJob::Upsert {
                    entity: EntityKind::Notification,
                    id: new_id,
                    fields: serde_json::to_value(&moved)?,
                });
                Ok(())
            }
            .await;
            match result {
                Ok(()) => report.notifications_moved += 1,
                Err(e) => report.fail(MergeStep::Notifications, e),
            }
        }
        match self
            .backend()
            .clear_notifications_for_user(remove_id)
            .await
        {
            Ok(_) => self
                .outbox()
                .enqueue(MirrorJob::ClearNotifications {
                    user_id: remove_id,
                }),
            Err(e) => report.fail(MergeStep::Notifications, e),
        }
    }

    /// Field-by-field merge with keeper precedence: only fields the keeper
    /// never set are taken from the duplicate.
    async fn merge_preferences(&self, keep_id: i64, remove_id: i64, report: &mut MergeReport) {
        let remove_prefs = match self.backend().prefs_for_user(remove_id).await {
            Ok(p) => p,
            Err(e) => return report.fail(MergeStep::Preferences, e),
        };
        let Some(remove_prefs) = remove_prefs else {
            return;
        };
        let keep_prefs = match self.backend().prefs_for_user(keep_id).await {
            Ok(p) => p,
            Err(e) => return report.fail(MergeStep::Preferences, e),
        };

        let patch = PrefsPatch {
            theme: match &keep_prefs {
                Some(k) if k.theme.is_some() => None,
                _ => remove_prefs.theme,
            },
            notification_enabled: match &keep_prefs {
                Some(k) if k.notification_enabled.is_some() => None,
                _ => remove_prefs.notification_enabled,
            },
            color_scheme: match &keep_prefs {
                Some(k) if k.color_scheme.is_some() => None,
                _ => remove_prefs.color_scheme.clone(),
            },
        };

        if !patch.is_empty() || keep_prefs.is_none() {
            if let Err(e) = self.set_user_preferences(keep_id, patch).await {
                report.fail(MergeStep::Preferences, e);
            }
        }

        let result: Result<()> = async {
            self.backend().delete_prefs_for_user(remove_id).await?;
            self.outbox().enqueue(MirrorJob::Delete {
                entity: EntityKind::UserPrefs,
                id: remove_prefs.preference_id,
            });
            Ok(())
        }
        .await;
        match result {
            Ok(()) => report.prefs_merged = true,
            Err(e) => report.fail(MergeStep::Preferences, e),
        }
    }
}
