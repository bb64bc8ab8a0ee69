//! Property-based tests for idempotent timeline merge

use std::collections::HashSet;

use proptest::prelude::*;
use xfpulse::shared::{ConversationIdentity, ConversationTimeline};

use crate::common::record_at;

proptest! {
    #[test]
    fn test_merge_is_idempotent_and_ordered(
        stamps in prop::collection::vec(0i64..50, 0..30),
        replay in prop::collection::vec(any::<prop::sample::Index>(), 0..30),
    ) {
        let conversation = ConversationIdentity::direct("c1");
        let records: Vec<_> = stamps.iter().map(|s| record_at(&conversation, *s)).collect();

        let mut timeline = ConversationTimeline::new(conversation.clone());
        prop_assert_eq!(timeline.merge(records.clone()), records.len());

        // Deliver a random subset again, as the other path would.
        if !records.is_empty() {
            let again: Vec<_> = replay.iter().map(|i| i.get(&records).clone()).collect();
            prop_assert_eq!(timeline.merge(again), 0);
        }

        prop_assert_eq!(timeline.len(), records.len());
        let ids: HashSet<_> = timeline.records().map(|r| r.id).collect();
        prop_assert_eq!(ids.len(), records.len());

        let keys: Vec<_> = timeline.records().map(|r| r.order_key()).collect();
        prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));

        let max = records.iter().map(|r| r.created_at).max();
        prop_assert_eq!(timeline.watermark().timestamp(), max);
    }

    #[test]
    fn test_foreign_records_are_ignored(stamps in prop::collection::vec(0i64..50, 1..10)) {
        let mine = ConversationIdentity::group("mine");
        let theirs = ConversationIdentity::group("theirs");
        let mut timeline = ConversationTimeline::new(mine);

        let foreign: Vec<_> = stamps.iter().map(|s| record_at(&theirs, *s)).collect();
        prop_assert_eq!(timeline.merge(foreign), 0);
        prop_assert!(timeline.is_empty());
    }
}
