//! Turning UID criteria into `SEARCH` expressions, and search results into batches.

use std::ops::RangeInclusive;

use crate::error::{Error, Result};
use crate::options::{Count, What};
use crate::types::Uid;
use crate::utils::iter_join;

/// A structured UID query.
///
/// ```
/// # use mail_retriever::cursor::UidSpec;
/// assert_eq!(UidSpec::from(7).to_criteria().unwrap(), "UID 7");
/// assert_eq!(UidSpec::from(3..=5).to_criteria().unwrap(), "UID 3,4,5");
/// assert_eq!(UidSpec::Bounded { from: Some(100), to: None }.to_criteria().unwrap(), "UID 100:*");
/// assert_eq!(UidSpec::from("all").to_criteria().unwrap(), "ALL");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UidSpec {
    /// Exactly one UID.
    Single(Uid),
    /// Any of these UIDs.
    List(Vec<Uid>),
    /// Every UID in the range, spelled out.
    Range(RangeInclusive<Uid>),
    /// An open-ended interval; a missing end is unbounded.
    Bounded {
        /// Lowest UID, inclusive.
        from: Option<Uid>,
        /// Highest UID, inclusive.
        to: Option<Uid>,
    },
    /// `all` (any case) for every message; anything else is a raw UID set such as `1:4,9`.
    Text(String),
}

impl UidSpec {
    /// The `SEARCH` criteria for this query.
    pub fn to_criteria(&self) -> Result<String> {
        match self {
            UidSpec::Single(uid) => Ok(format!("UID {}", uid)),
            UidSpec::List(uids) if uids.is_empty() => {
                Err(Error::InvalidOption("empty UID list".into()))
            }
            UidSpec::List(uids) => Ok(format!("UID {}", iter_join(uids, ","))),
            UidSpec::Range(range) if range.is_empty() => {
                Err(Error::InvalidOption("empty UID range".into()))
            }
            UidSpec::Range(range) => Ok(format!("UID {}", iter_join(range.clone(), ","))),
            UidSpec::Bounded { from, to } => Ok(match (from, to) {
                (Some(from), Some(to)) => format!("UID {}:{}", from, to),
                (Some(from), None) => format!("UID {}:*", from),
                (None, Some(to)) => format!("UID 1:{}", to),
                (None, None) => "ALL".to_string(),
            }),
            UidSpec::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    Err(Error::InvalidOption("empty UID criteria".into()))
                } else if text.eq_ignore_ascii_case("all") {
                    Ok("ALL".to_string())
                } else {
                    Ok(format!("UID {}", text))
                }
            }
        }
    }
}

impl From<Uid> for UidSpec {
    fn from(uid: Uid) -> Self {
        UidSpec::Single(uid)
    }
}

impl From<Vec<Uid>> for UidSpec {
    fn from(uids: Vec<Uid>) -> Self {
        UidSpec::List(uids)
    }
}

impl From<RangeInclusive<Uid>> for UidSpec {
    fn from(range: RangeInclusive<Uid>) -> Self {
        UidSpec::Range(range)
    }
}

impl From<&str> for UidSpec {
    fn from(text: &str) -> Self {
        UidSpec::Text(text.to_string())
    }
}

impl From<String> for UidSpec {
    fn from(text: String) -> Self {
        UidSpec::Text(text)
    }
}

/// Pick the UIDs a retrieval will hand out, in the order it hands them out.
///
/// `First` yields the lowest UIDs lowest-first, `Last` the highest UIDs highest-first. Duplicates
/// reported by the server are dropped.
pub fn select_uids(mut uids: Vec<Uid>, what: What, count: Count) -> Vec<Uid> {
    uids.sort_unstable();
    uids.dedup();
    if what == What::Last {
        uids.reverse();
    }
    if let Count::Limit(n) = count {
        uids.truncate(n);
    }
    uids
}

/// Split the selected UIDs into consecutive batches of at most `size`.
pub fn batches(uids: &[Uid], size: usize) -> impl Iterator<Item = &[Uid]> {
    uids.chunks(size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria() {
        assert_eq!(UidSpec::from(vec![3, 1, 2]).to_criteria().unwrap(), "UID 3,1,2");
        assert_eq!(
            UidSpec::Bounded {
                from: None,
                to: Some(9)
            }
            .to_criteria()
            .unwrap(),
            "UID 1:9"
        );
        assert_eq!(
            UidSpec::Bounded {
                from: Some(4),
                to: Some(9)
            }
            .to_criteria()
            .unwrap(),
            "UID 4:9"
        );
        assert_eq!(UidSpec::from("ALL").to_criteria().unwrap(), "ALL");
        assert_eq!(UidSpec::from("1:4,9").to_criteria().unwrap(), "UID 1:4,9");
    }

    #[test]
    fn empty_criteria_are_rejected() {
        assert!(matches!(
            UidSpec::List(vec![]).to_criteria(),
            Err(Error::InvalidOption(_))
        ));
        #[allow(clippy::reversed_empty_ranges)]
        let empty = UidSpec::Range(5..=1);
        assert!(empty.to_criteria().is_err());
        assert!(UidSpec::from(" ").to_criteria().is_err());
    }

    #[test]
    fn last_takes_the_highest() {
        let uids = vec![103, 101, 105, 102, 104];
        assert_eq!(select_uids(uids.clone(), What::Last, Count::Limit(2)), [105, 104]);
        assert_eq!(select_uids(uids.clone(), What::First, Count::Limit(2)), [101, 102]);
        assert_eq!(
            select_uids(uids, What::First, Count::All),
            [101, 102, 103, 104, 105]
        );
    }

    #[test]
    fn count_larger_than_result() {
        assert_eq!(select_uids(vec![2, 1], What::Last, Count::Limit(10)), [2, 1]);
        assert!(select_uids(vec![], What::First, Count::All).is_empty());
    }

    #[test]
    fn batches_repartition_without_loss() {
        let uids: Vec<Uid> = (1..=23).collect();
        for size in 1..=25 {
            let chunks: Vec<&[Uid]> = batches(&uids, size).collect();
            assert_eq!(chunks.len(), (uids.len() + size - 1) / size);
            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
            assert_eq!(chunks.concat(), uids);
        }
    }
}
