use std::vec::IntoIter;

/// The result of an aggregating retrieval.
///
/// A call asking for exactly one item (`count == 1`) that finds exactly one item yields
/// [`Found::One`]; everything else, including a `count == 1` call that finds nothing, yields
/// [`Found::Many`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Found<T> {
    /// A single item.
    One(T),
    /// Zero or more items, in result order.
    Many(Vec<T>),
}

impl<T> Found<T> {
    /// Collapse `items` to a bare scalar when exactly one item was both requested and found.
    pub(crate) fn collapse(mut items: Vec<T>, single: bool) -> Self {
        if single && items.len() == 1 {
            if let Some(item) = items.pop() {
                return Found::One(item);
            }
        }
        Found::Many(items)
    }

    /// Number of items held.
    pub fn len(&self) -> usize {
        match self {
            Found::One(_) => 1,
            Found::Many(items) => items.len(),
        }
    }

    /// Returns true if nothing was found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single item, if this result was collapsed to one.
    pub fn one(self) -> Option<T> {
        match self {
            Found::One(item) => Some(item),
            Found::Many(_) => None,
        }
    }

    /// All items as a vector, whether or not the result was collapsed.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Found::One(item) => vec![item],
            Found::Many(items) => items,
        }
    }
}

impl<T> IntoIterator for Found<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::Found;

    #[test]
    fn single_requested_and_found_collapses() {
        assert_eq!(Found::collapse(vec![7], true), Found::One(7));
    }

    #[test]
    fn single_requested_nothing_found_stays_empty() {
        let found: Found<u32> = Found::collapse(vec![], true);
        assert_eq!(found, Found::Many(vec![]));
        assert!(found.is_empty());
    }

    #[test]
    fn many_requested_one_found_stays_a_collection() {
        assert_eq!(Found::collapse(vec![7], false), Found::Many(vec![7]));
    }

    #[test]
    fn into_vec_unwraps_either_shape() {
        assert_eq!(Found::One(1).into_vec(), vec![1]);
        assert_eq!(Found::Many(vec![1, 2]).into_iter().count(), 2);
    }
}
