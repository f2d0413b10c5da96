use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// A score with a total order, so it can key a `BTreeSet`.
#[derive(Debug, Clone, Copy)]
pub struct Score(pub f64);

impl Score {
    /// Fold `-0.0` into `0.0` so both sort as the same score.
    fn normalized(value: f64) -> Self {
        Score(if value == 0.0 { 0.0 } else { value })
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One end of a score range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
}

impl ScoreBound {
    /// Parse a range bound the way Redis does: `-inf`, `+inf`, `inf`, a number,
    /// or `(` followed by any of those for an exclusive bound.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let (exclusive, text) = match text.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let value = match text.to_ascii_lowercase().as_str() {
            "-inf" => f64::NEG_INFINITY,
            "+inf" | "inf" => f64::INFINITY,
            other => other.parse::<f64>().ok().filter(|v| !v.is_nan())?,
        };
        Some(if exclusive {
            ScoreBound::Exclusive(value)
        } else {
            ScoreBound::Inclusive(value)
        })
    }

    fn admits_above(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(min) => score >= min,
            ScoreBound::Exclusive(min) => score > min,
        }
    }

    fn admits_below(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(max) => score <= max,
            ScoreBound::Exclusive(max) => score < max,
        }
    }
}

/// An ordered set of unique byte-string members, ordered by (score, member).
#[derive(Debug, Default)]
pub struct SortedSet {
    by_member: HashMap<Vec<u8>, Score>,
    ordered: BTreeSet<(Score, Vec<u8>)>,
}

impl SortedSet {
    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    /// Insert a member, or move it to the new score if already present.
    /// Returns true when the member is new.
    pub fn insert(&mut self, score: f64, member: Vec<u8>) -> bool {
        let score = Score::normalized(score);
        match self.by_member.insert(member.clone(), score) {
            Some(old) => {
                self.ordered.remove(&(old, member.clone()));
                self.ordered.insert((score, member));
                false
            }
            None => {
                self.ordered.insert((score, member));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.by_member.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_vec()));
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.by_member.get(member).map(|s| s.0)
    }

    /// Members with score in `[min, max]` (respecting exclusive bounds), in
    /// ascending (score, member) order, skipping `offset` and returning at most
    /// `count` entries when a count is given.
    pub fn range_by_score(
        &self,
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        count: Option<usize>,
    ) -> Vec<(f64, Vec<u8>)> {
        let start = match min {
            ScoreBound::Inclusive(v) | ScoreBound::Exclusive(v) => Score::normalized(v),
        };
        let iter = self
            .ordered
            .range((Bound::Included((start, Vec::new())), Bound::Unbounded))
            .skip_while(|(score, _)| !min.admits_above(score.0))
            .take_while(|(score, _)| max.admits_below(score.0))
            .skip(offset)
            .map(|(score, member)| (score.0, member.clone()));
        match count {
            Some(count) => iter.take(count).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(entries: Vec<(f64, Vec<u8>)>) -> Vec<Vec<u8>> {
        entries.into_iter().map(|(_, m)| m).collect()
    }

    #[test]
    fn range_is_ordered_by_score_then_member() {
        let mut set = SortedSet::default();
        set.insert(300.0, b"c".to_vec());
        set.insert(100.0, b"b".to_vec());
        set.insert(100.0, b"a".to_vec());
        set.insert(200.0, b"d".to_vec());

        let all = set.range_by_score(
            ScoreBound::Inclusive(f64::NEG_INFINITY),
            ScoreBound::Inclusive(f64::INFINITY),
            0,
            None,
        );
        assert_eq!(
            members(all),
            vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn reinserting_member_updates_score_in_place() {
        let mut set = SortedSet::default();
        assert!(set.insert(100.0, b"m".to_vec()));
        assert!(!set.insert(500.0, b"m".to_vec()));
        assert_eq!(set.len(), 1);
        assert_eq!(set.score(b"m"), Some(500.0));

        let early = set.range_by_score(
            ScoreBound::Inclusive(f64::NEG_INFINITY),
            ScoreBound::Inclusive(200.0),
            0,
            None,
        );
        assert!(early.is_empty());
    }

    #[test]
    fn upper_bound_and_count_limit_selection() {
        let mut set = SortedSet::default();
        for i in 0..10 {
            set.insert(f64::from(i), vec![b'a' + i as u8]);
        }
        let due = set.range_by_score(
            ScoreBound::Inclusive(f64::NEG_INFINITY),
            ScoreBound::Inclusive(5.0),
            0,
            Some(3),
        );
        assert_eq!(members(due), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        let rest = set.range_by_score(
            ScoreBound::Exclusive(2.0),
            ScoreBound::Exclusive(5.0),
            0,
            None,
        );
        assert_eq!(members(rest), vec![b"d".to_vec(), b"e".to_vec()]);

        let paged = set.range_by_score(
            ScoreBound::Inclusive(0.0),
            ScoreBound::Inclusive(9.0),
            8,
            Some(5),
        );
        assert_eq!(members(paged), vec![b"i".to_vec(), b"j".to_vec()]);
    }

    #[test]
    fn remove_drops_member() {
        let mut set = SortedSet::default();
        set.insert(1.0, b"x".to_vec());
        assert!(set.remove(b"x"));
        assert!(!set.remove(b"x"));
        assert!(set.is_empty());
    }

    #[test]
    fn bounds_parse_like_redis() {
        assert_eq!(
            ScoreBound::parse(b"-inf"),
            Some(ScoreBound::Inclusive(f64::NEG_INFINITY))
        );
        assert_eq!(
            ScoreBound::parse(b"+inf"),
            Some(ScoreBound::Inclusive(f64::INFINITY))
        );
        assert_eq!(
            ScoreBound::parse(b"(1700000000123"),
            Some(ScoreBound::Exclusive(1_700_000_000_123.0))
        );
        assert_eq!(ScoreBound::parse(b"42"), Some(ScoreBound::Inclusive(42.0)));
        assert_eq!(ScoreBound::parse(b"nope"), None);
    }
}
