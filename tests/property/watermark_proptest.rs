//! Property-based tests for watermark monotonicity

use std::sync::Arc;

use proptest::prelude::*;
use xfpulse::backend::messaging::{MemoryRecordStore, RecordStore};
use xfpulse::backend::realtime::{ReconciliationPoller, ViewHandle};
use xfpulse::shared::{ConversationIdentity, DraftRecord, Watermark};

use crate::common::ts;

proptest! {
    #[test]
    fn test_advance_never_rewinds(stamps in prop::collection::vec(0i64..1_000, 1..40)) {
        let mut watermark = Watermark::BEGINNING;
        let mut previous = watermark;
        for secs in &stamps {
            watermark.advance_to(ts(*secs));
            prop_assert!(watermark >= previous);
            previous = watermark;
        }
        let max = stamps.iter().copied().max().map(ts);
        prop_assert_eq!(watermark.timestamp(), max);
    }

    #[test]
    fn test_admits_only_newer(mark in 0i64..100, stamp in 0i64..100) {
        let conversation = ConversationIdentity::direct("c1");
        let record = crate::common::record_at(&conversation, stamp);
        prop_assert_eq!(Watermark::at(ts(mark)).admits(&record), stamp > mark);
        prop_assert!(Watermark::BEGINNING.admits(&record));
    }

    #[test]
    fn test_poller_watermark_tracks_max_seen(writes in prop::collection::vec(0usize..4, 1..8)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = Arc::new(MemoryRecordStore::new());
            let conversation = ConversationIdentity::group("g");
            let mut poller = ReconciliationPoller::new(
                ViewHandle::new(1),
                conversation.clone(),
                store.clone(),
                Watermark::BEGINNING,
                |_, _| Ok(()),
            );

            let mut newest = None;
            let mut delivered = 0;
            for count in &writes {
                for _ in 0..*count {
                    let record = store
                        .append(DraftRecord::new(conversation.clone(), "p", "x"))
                        .await
                        .unwrap();
                    newest = Some(record.created_at);
                }
                let before = poller.watermark();
                let batch = poller.tick().await.unwrap();
                delivered += batch.len();

                prop_assert!(poller.watermark() >= before);
                prop_assert_eq!(batch.len(), *count);
                prop_assert_eq!(poller.watermark().timestamp(), newest);
            }
            prop_assert_eq!(delivered, store.len());
            Ok(())
        })?;
    }
}
