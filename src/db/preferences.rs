//! Preference operations: at most one row per user, upsert semantics.

use crate::error::Result;
use crate::mirror::{EntityKind, MirrorJob};
use crate::types::{now_rfc3339, PrefsPatch, UserPrefs};

use super::Db;

impl Db {
    /// Check-then-update-or-insert. Supplied fields merge over the existing
    /// row; `updated_at` is always refreshed; a second row is never created.
    pub async fn set_user_preferences(
        &self,
        user_id: i64,
        patch: PrefsPatch,
    ) -> Result<UserPrefs> {
        let now = now_rfc3339();
        match self.backend().prefs_for_user(user_id).await? {
            Some(existing) => {
                self.backend()
                    .update_prefs(existing.preference_id, &patch, &now)
                    .await?;
                let merged = UserPrefs {
                    theme: patch.theme.or(existing.theme),
                    notification_enabled: patch
                        .notification_enabled
                        .or(existing.notification_enabled),
                    color_scheme: patch.color_scheme.clone().or(existing.color_scheme),
                    updated_at: now,
                    ..existing
                };
                self.outbox().enqueue(MirrorJob::Upsert {
                    entity: EntityKind::UserPrefs,
                    id: merged.preference_id,
                    fields: serde_json::to_value(&merged)?,
                });
                Ok(merged)
            }
            None => {
                let prefs = UserPrefs {
                    preference_id: 0,
                    user_id,
                    theme: patch.theme,
                    notification_enabled: patch.notification_enabled,
                    color_scheme: patch.color_scheme,
                    updated_at: now,
                };
                let id = self.backend().insert_prefs(&prefs).await?;
                let prefs = UserPrefs {
                    preference_id: id,
                    ..prefs
                };
                self.outbox().enqueue(MirrorJob::Upsert {
                    entity: EntityKind::UserPrefs,
                    id,
                    fields: serde_json::to_value(&prefs)?,
                });
                Ok(prefs)
            }
        }
    }

    pub async fn get_user_preferences(&self, user_id: i64) -> Result<Option<UserPrefs>> {
        Ok(self.backend().prefs_for_user(user_id).await?)
    }
}
