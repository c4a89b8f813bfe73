//! Property checks on the bounded structures and the wildcard matcher.

use chrono::Utc;
use proptest::prelude::*;

use browser_control::auth::pattern_matches;
use browser_control::session::{ActionHistory, ActionRecord, ACTION_HISTORY_CAP};

fn record(i: u64) -> ActionRecord {
    ActionRecord {
        action: format!("action-{i}"),
        selector: None,
        success: i % 2 == 0,
        duration_ms: i,
        timestamp: Utc::now(),
    }
}

proptest! {
    #[test]
    fn history_is_bounded_and_keeps_the_newest(pushes in 0u64..64) {
        let mut history = ActionHistory::default();
        for i in 0..pushes {
            history.push(record(i));
        }

        prop_assert!(history.len() <= ACTION_HISTORY_CAP);
        prop_assert_eq!(history.len(), (pushes as usize).min(ACTION_HISTORY_CAP));

        if pushes > 0 {
            let newest = history.iter().last().unwrap();
            prop_assert_eq!(newest.duration_ms, pushes - 1);
        }
    }

    #[test]
    fn trailing_wildcard_matches_exactly_its_prefix_extensions(
        prefix in "[a-z_]{0,10}",
        rest in "[a-z_]{0,10}",
    ) {
        let pattern = format!("{prefix}*");
        let value = format!("{prefix}{rest}");
        prop_assert!(pattern_matches(&pattern, &value));

        // A literal pattern matches only itself.
        prop_assert_eq!(pattern_matches(&prefix, &value), rest.is_empty());
    }

    #[test]
    fn wildcard_never_matches_outside_its_prefix(
        prefix in "[a-z]{3,6}",
        other in "[0-9]{1,6}",
    ) {
        let pattern = format!("{prefix}*");
        prop_assert!(!pattern_matches(&pattern, &other));
    }
}
