use batchloom::item::{Item, ItemStatus};
use batchloom::runtime::Checkpoint;
use proptest::prelude::*;
use serde_json::json;

fn status_strategy() -> impl Strategy<Value = ItemStatus> {
    prop_oneof![
        Just(ItemStatus::Pending),
        Just(ItemStatus::Processing),
        Just(ItemStatus::Completed),
        Just(ItemStatus::Failed),
        Just(ItemStatus::AwaitingAgent),
    ]
}

proptest! {
    /// The persisted counters always agree with the item list, whatever
    /// shape the items are in.
    #[test]
    fn recount_always_matches_the_items(
        entries in prop::collection::vec((status_strategy(), 0u32..6), 0..20),
        max_retries in 0u32..5,
    ) {
        let mut cp = Checkpoint::from_input(entries.iter().map(|_| json!(null)).collect());
        for (item, (status, attempts)) in cp.items.iter_mut().zip(&entries) {
            item.status = *status;
            item.attempts = *attempts;
        }
        cp.recount(max_retries);

        let completed = entries
            .iter()
            .filter(|entry| entry.0 == ItemStatus::Completed)
            .count() as u32;
        let failed = entries
            .iter()
            .filter(|entry| entry.0 == ItemStatus::Failed && entry.1 >= max_retries)
            .count() as u32;
        prop_assert_eq!(cp.completed_count, completed);
        prop_assert_eq!(cp.failed_count, failed);
    }

    /// Items survive a JSON round-trip field-by-field, including log order.
    #[test]
    fn items_round_trip_through_json(
        texts in prop::collection::vec(".{0,12}", 0..8),
        attempts in 0u32..9,
    ) {
        let mut item = Item::new(0, json!({"payload": texts.clone()}));
        item.attempts = attempts;
        item.logs = texts.clone();

        let value = serde_json::to_value(&item).unwrap();
        let back: Item = serde_json::from_value(value).unwrap();
        prop_assert_eq!(back, item);
    }
}
