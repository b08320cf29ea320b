//! # Draft Store
//!
//! Open sale drafts, keyed by `draft_id`.
//!
//! ## Draft States
//! ```text
//!                 start_draft
//!                      │
//!                      ▼
//!   void ◄──────── Drafting ◄──────────────┐
//!  (removed)           │                    │ commit failed
//!                      │ begin_commit       │ (rolled back, or guard dropped)
//!                      ▼                    │
//!                 Committing ───────────────┘
//!                      │
//!                      │ commit succeeded
//!                      ▼
//!                  (removed; the Sale is now durable)
//! ```
//!
//! ## Locking
//! The map sits behind a `std::sync::Mutex`. Every method takes the lock,
//! does its in-memory work and releases it; no lock is held across an
//! `.await`. Product lookups and storage writes happen outside.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ironbox_core::{CoreError, CoreResult, DraftView, SaleDraft};

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    Drafting,
    Committing,
}

#[derive(Debug)]
struct DraftSlot {
    draft: SaleDraft,
    state: DraftState,
}

#[derive(Debug, Default)]
pub struct DraftStore {
    slots: Mutex<HashMap<String, DraftSlot>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DraftSlot>> {
        // A panic elsewhere cannot leave a slot half-written; keep serving.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, draft: SaleDraft) {
        self.lock().insert(
            draft.draft_id().to_string(),
            DraftSlot {
                draft,
                state: DraftState::Drafting,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn state(&self, draft_id: &str) -> LedgerResult<DraftState> {
        self.lock()
            .get(draft_id)
            .map(|slot| slot.state)
            .ok_or_else(|| LedgerError::DraftNotFound(draft_id.to_string()))
    }

    pub fn view(&self, draft_id: &str) -> LedgerResult<DraftView> {
        self.lock()
            .get(draft_id)
            .map(|slot| slot.draft.view())
            .ok_or_else(|| LedgerError::DraftNotFound(draft_id.to_string()))
    }

    /// Fails unless the draft exists and is in `Drafting`.
    pub fn ensure_editable(&self, draft_id: &str) -> LedgerResult<()> {
        match self.state(draft_id)? {
            DraftState::Drafting => Ok(()),
            DraftState::Committing => Err(LedgerError::DraftNotEditable(draft_id.to_string())),
        }
    }

    /// Runs `mutate` against an editable draft and returns its new view.
    ///
    /// Draft operations leave the draft untouched when they fail.
    pub fn update<T>(
        &self,
        draft_id: &str,
        mutate: impl FnOnce(&mut SaleDraft) -> CoreResult<T>,
    ) -> LedgerResult<(T, DraftView)> {
        let mut slots = self.lock();
        let slot = slots
            .get_mut(draft_id)
            .ok_or_else(|| LedgerError::DraftNotFound(draft_id.to_string()))?;

        if slot.state == DraftState::Committing {
            return Err(LedgerError::DraftNotEditable(draft_id.to_string()));
        }

        let value = mutate(&mut slot.draft)?;
        Ok((value, slot.draft.view()))
    }

    /// Marks the draft `Committing` and hands back a guard over a snapshot
    /// to write.
    ///
    /// An empty draft is refused and stays `Drafting`. The draft returns to
    /// `Drafting` when the guard drops, unless [`CommitGuard::complete`] was
    /// called first; a commit future that is cancelled mid-flight therefore
    /// leaves the draft editable again.
    pub fn begin_commit(&self, draft_id: &str) -> LedgerResult<CommitGuard<'_>> {
        let mut slots = self.lock();
        let slot = slots
            .get_mut(draft_id)
            .ok_or_else(|| LedgerError::DraftNotFound(draft_id.to_string()))?;

        if slot.state == DraftState::Committing {
            return Err(LedgerError::DraftNotEditable(draft_id.to_string()));
        }
        if slot.draft.is_empty() {
            return Err(CoreError::EmptySale.into());
        }

        slot.state = DraftState::Committing;
        Ok(CommitGuard {
            store: self,
            draft_id: draft_id.to_string(),
            draft: slot.draft.clone(),
            committed: false,
        })
    }

    /// Removes the draft on success, reopens it otherwise.
    fn finish_commit(&self, draft_id: &str, committed: bool) {
        let mut slots = self.lock();
        if committed {
            slots.remove(draft_id);
        } else if let Some(slot) = slots.get_mut(draft_id) {
            slot.state = DraftState::Drafting;
        }
    }

    /// Discards a draft. Nothing was ever written for it.
    pub fn void(&self, draft_id: &str) -> LedgerResult<SaleDraft> {
        let mut slots = self.lock();
        match slots.get(draft_id).map(|slot| slot.state) {
            None => Err(LedgerError::DraftNotFound(draft_id.to_string())),
            Some(DraftState::Committing) => {
                Err(LedgerError::DraftNotEditable(draft_id.to_string()))
            }
            Some(DraftState::Drafting) => slots
                .remove(draft_id)
                .map(|slot| slot.draft)
                .ok_or_else(|| LedgerError::DraftNotFound(draft_id.to_string())),
        }
    }
}

// =============================================================================
// Commit Guard
// =============================================================================

/// A draft held in `Committing`.
#[must_use = "dropping the guard reopens the draft"]
#[derive(Debug)]
pub struct CommitGuard<'a> {
    store: &'a DraftStore,
    draft_id: String,
    draft: SaleDraft,
    committed: bool,
}

impl CommitGuard<'_> {
    /// The snapshot taken when the commit began.
    pub fn draft(&self) -> &SaleDraft {
        &self.draft
    }

    /// The sale is durable; the draft is removed when the guard drops.
    pub fn complete(mut self) {
        self.committed = true;
    }
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.store.finish_commit(&self.draft_id, self.committed);
    }
}
