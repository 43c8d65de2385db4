//! Like/dislike toggling.
//!
//! A user holds at most one reaction per target, enforced by the
//! `(user_id, target_id)` primary key. Each toggle reads the current row,
//! decides the next state and writes it inside one IMMEDIATE transaction, so
//! concurrent toggles from the same user serialize instead of interleaving.

use anyhow::Result;
use rusqlite::TransactionBehavior;
use tracing::debug;
use vidfeed_types::models::{ReactionState, ReactionTarget, ReactionType, Transition};

use crate::Database;
use crate::models::now_micros;
use crate::queries::OptionalExt;

impl Database {
    /// Apply a like/dislike request and return the resulting state.
    ///
    /// The target must exist; callers check that first since reactions carry
    /// no foreign key to their target.
    pub fn toggle_reaction(
        &self,
        user_id: &str,
        target: &ReactionTarget,
        requested: ReactionType,
    ) -> Result<ReactionState> {
        let target_id = target.id.to_string();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current: Option<String> = tx
                .query_row(
                    "SELECT type FROM reactions WHERE user_id = ?1 AND target_id = ?2",
                    [user_id, target_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let current = match current {
                Some(ty) => Some(ty.parse::<ReactionType>()?),
                None => None,
            };

            let (transition, next) = ReactionState::from(current).toggle(requested);
            let now = now_micros();

            match transition {
                Transition::Insert(ty) => {
                    // The conflict arm only fires if another connection wrote
                    // the row since the read above.
                    tx.execute(
                        "INSERT INTO reactions (user_id, target_kind, target_id, type, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                         ON CONFLICT(user_id, target_id) DO UPDATE SET
                             type = excluded.type,
                             target_kind = excluded.target_kind,
                             updated_at = excluded.updated_at",
                        rusqlite::params![user_id, target.kind.as_str(), target_id, ty.as_str(), now],
                    )?;
                }
                Transition::Update(ty) => {
                    tx.execute(
                        "UPDATE reactions SET type = ?3, updated_at = ?4
                         WHERE user_id = ?1 AND target_id = ?2",
                        rusqlite::params![user_id, target_id, ty.as_str(), now],
                    )?;
                }
                Transition::Delete => {
                    tx.execute(
                        "DELETE FROM reactions WHERE user_id = ?1 AND target_id = ?2",
                        [user_id, target_id.as_str()],
                    )?;
                }
            }

            tx.commit()?;

            debug!(
                "Reaction {} on {} {} by {}: {:?} -> {:?}",
                requested, target.kind.as_str(), target_id, user_id, current, next
            );
            Ok(next)
        })
    }

    /// The user's current reaction on a target.
    pub fn reaction_state(&self, user_id: &str, target_id: &str) -> Result<ReactionState> {
        let ty: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT type FROM reactions WHERE user_id = ?1 AND target_id = ?2",
                [user_id, target_id],
                |row| row.get(0),
            )
            .optional()
        })?;

        match ty {
            Some(ty) => Ok(ReactionState::from(ty.parse::<ReactionType>()?)),
            None => Ok(ReactionState::None),
        }
    }
}
