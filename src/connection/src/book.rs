use serde_json::Value;
use std::time::{Duration, Instant};
use xf_types::{BookLevel, Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum BookUpdate {
    Snapshot(Vec<BookLevel>),
    Diff(BookLevel),
}

/// An empty array or an array of arrays is a snapshot, anything else a single level.
pub fn classify_book(
    data: &Value,
    level: impl Fn(&Value) -> Result<BookLevel>,
) -> Result<BookUpdate> {
    let entries = data
        .as_array()
        .ok_or_else(|| Error::MalformedMessage(format!("book payload is not an array: {data}")))?;
    match entries.first() {
        None => Ok(BookUpdate::Snapshot(Vec::new())),
        Some(Value::Array(_)) => entries
            .iter()
            .map(level)
            .collect::<Result<Vec<_>>>()
            .map(BookUpdate::Snapshot),
        Some(_) => level(data).map(BookUpdate::Diff),
    }
}

/// Book state of one channel with throttled emission.
///
/// The levels are updated on every message. Emission happens at most once per
/// window; an update inside the window marks the book dirty and [`OrderBook::take_due`]
/// emits the then-current state once the window has passed.
pub struct OrderBook {
    levels: Vec<BookLevel>,
    window: Duration,
    last_emitted_at: Option<Instant>,
    dirty: bool,
}

impl OrderBook {
    pub fn new(window: Duration) -> OrderBook {
        OrderBook {
            levels: Vec::new(),
            window,
            last_emitted_at: None,
            dirty: false,
        }
    }

    pub fn levels(&self) -> &[BookLevel] {
        &self.levels
    }

    /// Merges the update and reports whether the book should be emitted now.
    ///
    /// Levels are keyed by price. A `count == 0` level is stored as given.
    pub fn apply(&mut self, update: BookUpdate, now: Instant) -> bool {
        match update {
            BookUpdate::Snapshot(levels) => self.levels = levels,
            BookUpdate::Diff(level) => {
                match self.levels.iter_mut().find(|l| l.price == level.price) {
                    Some(existing) => *existing = level,
                    None => self.levels.push(level),
                }
            }
        }
        self.dirty = true;
        self.take_due(now)
    }

    pub fn take_due(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        let due = self
            .last_emitted_at
            .map_or(true, |at| now.saturating_duration_since(at) > self.window);
        if due {
            self.last_emitted_at = Some(now);
            self.dirty = false;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use test_case::test_case;
    use xf_types::fields::Fields;

    const WINDOW: Duration = Duration::from_millis(1000);

    fn level(value: &Value) -> Result<BookLevel> {
        let f = Fields::new(value)?;
        Ok(BookLevel::new(f.decimal(0)?, f.u64(1)? as u32, f.decimal(2)?))
    }

    fn lvl(price: i64, count: u32, amount: i64) -> BookLevel {
        BookLevel::new(Decimal::from(price), count, Decimal::from(amount))
    }

    #[test]
    fn classifies_snapshots_and_diffs() {
        assert_eq!(
            classify_book(&json!([]), level).unwrap(),
            BookUpdate::Snapshot(vec![])
        );
        assert_eq!(
            classify_book(&json!([[4000, 1, -1], [3999, 2, 3]]), level).unwrap(),
            BookUpdate::Snapshot(vec![lvl(4000, 1, -1), lvl(3999, 2, 3)])
        );
        assert_eq!(
            classify_book(&json!([4000, 1, -1]), level).unwrap(),
            BookUpdate::Diff(lvl(4000, 1, -1))
        );
    }

    #[test_case(json!("hb") ; "string")]
    #[test_case(json!({"price": 1}) ; "object")]
    #[test_case(json!([[4000, 1]]) ; "short level")]
    fn rejects_malformed_books(data: Value) {
        assert!(classify_book(&data, level).is_err());
    }

    #[test]
    fn diff_on_empty_snapshot() {
        let now = Instant::now();
        let mut book = OrderBook::new(WINDOW);
        book.apply(classify_book(&json!([]), level).unwrap(), now);
        book.apply(classify_book(&json!([4000, 1, -1]), level).unwrap(), now);

        assert_eq!(book.levels(), &[lvl(4000, 1, -1)]);
    }

    #[test]
    fn diff_replaces_level_with_same_price() {
        let now = Instant::now();
        let mut book = OrderBook::new(WINDOW);
        book.apply(BookUpdate::Snapshot(vec![lvl(4000, 1, -1), lvl(3990, 1, 2)]), now);
        book.apply(BookUpdate::Diff(lvl(3990, 0, 1)), now);

        assert_eq!(book.levels(), &[lvl(4000, 1, -1), lvl(3990, 0, 1)]);
    }

    #[test]
    fn two_quick_diffs_emit_once_with_latest_state() {
        let start = Instant::now();
        let mut book = OrderBook::new(WINDOW);
        assert!(book.apply(BookUpdate::Snapshot(vec![]), start));

        assert!(!book.apply(BookUpdate::Diff(lvl(4000, 1, -1)), start + Duration::from_millis(10)));
        assert!(!book.apply(BookUpdate::Diff(lvl(4000, 2, -3)), start + Duration::from_millis(20)));
        assert!(!book.take_due(start + Duration::from_millis(500)));

        assert!(book.take_due(start + Duration::from_millis(1001)));
        assert_eq!(book.levels(), &[lvl(4000, 2, -3)]);
        assert!(!book.take_due(start + Duration::from_millis(5000)));
    }

    #[test]
    fn update_after_window_emits_immediately() {
        let start = Instant::now();
        let mut book = OrderBook::new(WINDOW);
        assert!(book.apply(BookUpdate::Snapshot(vec![]), start));
        assert!(book.apply(BookUpdate::Diff(lvl(1, 1, 1)), start + Duration::from_millis(1500)));
    }
}
