//! Consumer-side state
//!
//! Applies dispatched events to one [`ConversationTimeline`] per open view.
//! Poll batches are merged directly. A refresh signal carries only a record
//! id, so the consumer re-reads everything newer than what each affected
//! view already shows. Merging is idempotent by record id, so the same
//! record arriving through both paths is shown once.

use std::collections::HashMap;
use std::sync::Arc;

use super::dispatcher::ConsumerEvent;
use super::poller::ViewHandle;
use crate::backend::error::RealtimeError;
use crate::backend::messaging::RecordStore;
use crate::shared::{ChatRecord, ConversationTimeline};

pub struct ConsumerState {
    store: Arc<dyn RecordStore>,
    views: HashMap<ViewHandle, ConversationTimeline>,
}

impl ConsumerState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            views: HashMap::new(),
        }
    }

    /// Track a view, seeded with its initial load
    pub fn insert_view(&mut self, view: ViewHandle, timeline: ConversationTimeline) {
        self.views.insert(view, timeline);
    }

    pub fn remove_view(&mut self, view: ViewHandle) -> Option<ConversationTimeline> {
        self.views.remove(&view)
    }

    pub fn timeline(&self, view: ViewHandle) -> Option<&ConversationTimeline> {
        self.views.get(&view)
    }

    /// Records of a view in display order
    pub fn records(&self, view: ViewHandle) -> Vec<ChatRecord> {
        self.views
            .get(&view)
            .map(|t| t.records().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply one event; returns how many records became visible
    ///
    /// Events for views that are no longer tracked are ignored. A failed
    /// refresh read skips only that view; the error is returned when no
    /// affected view could be refreshed.
    pub async fn apply(&mut self, event: ConsumerEvent) -> Result<usize, RealtimeError> {
        match event {
            ConsumerEvent::PollBatch { view, records } => {
                Ok(self.views.get_mut(&view).map_or(0, |t| t.merge(records)))
            }
            ConsumerEvent::Refresh {
                conversation,
                record_id,
            } => {
                let mut inserted = 0;
                let mut refreshed = 0;
                let mut failure = None;
                for (view, timeline) in self
                    .views
                    .iter_mut()
                    .filter(|(_, t)| t.conversation() == &conversation && !t.contains(&record_id))
                {
                    match self.store.records_after(&conversation, timeline.watermark()).await {
                        Ok(fresh) => {
                            refreshed += 1;
                            inserted += timeline.merge(fresh);
                        }
                        Err(e) => {
                            tracing::warn!("[Consumer] Refresh of {} failed: {}", view, e);
                            failure = Some(e);
                        }
                    }
                }
                match failure {
                    Some(e) if refreshed == 0 => Err(e),
                    _ => Ok(inserted),
                }
            }
        }
    }
}
