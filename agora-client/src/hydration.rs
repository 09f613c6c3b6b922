//! On-demand loading of an assistant's heavy fields.
//!
//! Hydrated records only ever live in memory. The persistent cache keeps the
//! listing projection, so nothing here touches the cache store.

use std::sync::Arc;

use agora_core::convert::hydrate_summary;
use agora_core::{AgoraError, AgoraResult, Assistant, AssistantId, DirectoryBackend, FullAssistant};
use tracing::{debug, warn};

use crate::directory::DirectoryStore;
use crate::session::{SessionContext, SessionSlot};

pub struct HydrationController {
    backend: Arc<dyn DirectoryBackend>,
    directory: Arc<DirectoryStore>,
    sessions: Arc<SessionSlot>,
}

impl std::fmt::Debug for HydrationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HydrationController").finish_non_exhaustive()
    }
}

impl HydrationController {
    pub fn new(
        backend: Arc<dyn DirectoryBackend>,
        directory: Arc<DirectoryStore>,
        sessions: Arc<SessionSlot>,
    ) -> Self {
        Self {
            backend,
            directory,
            sessions,
        }
    }

    /// Return the full record for `assistant_id`, fetching it if the
    /// directory only holds the listing projection.
    ///
    /// # Errors
    ///
    /// [`AgoraError::NotFound`] if the assistant is not in the directory,
    /// the network error of a failed detail fetch, or
    /// [`AgoraError::SessionEnded`] if the session changed during the fetch.
    /// The directory is left unchanged on error.
    pub async fn hydrate(
        &self,
        session: &Arc<SessionContext>,
        assistant_id: &AssistantId,
    ) -> AgoraResult<FullAssistant> {
        let summary = match self.directory.find(assistant_id) {
            Some(Assistant::Full(full)) => {
                debug!(assistant_id = %assistant_id, "already hydrated");
                return Ok(full);
            }
            Some(Assistant::Lightweight(summary)) => summary,
            None => {
                return Err(AgoraError::NotFound {
                    assistant_id: assistant_id.clone(),
                })
            }
        };

        let detail = self
            .backend
            .fetch_assistant(&session.credential, assistant_id)
            .await
            .map_err(|err| {
                warn!(assistant_id = %assistant_id, error = %err, "assistant fetch failed");
                AgoraError::from(err)
            })?;

        let hydrated = hydrate_summary(summary, &detail);
        for degraded in &hydrated.degraded {
            warn!(assistant_id = %assistant_id, error = %degraded, "structured field emptied");
        }

        if !self.sessions.is_current(session) {
            debug!(assistant_id = %assistant_id, "session changed, hydration discarded");
            return Err(AgoraError::SessionEnded);
        }

        match self.directory.replace_on_hydrate(hydrated.assistant.clone()) {
            Some(merged) => {
                debug!(assistant_id = %assistant_id, "assistant hydrated");
                Ok(merged)
            }
            None => Ok(hydrated.assistant),
        }
    }
}
