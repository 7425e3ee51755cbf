use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;

/// Integer identity allocator for one collection.
///
/// Seeded from the identifiers already on disk; hands out `max + 1` onward and
/// never returns the same value twice, even when the seed is unordered.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    collection: &'static str,
    next: u64,
    used: BTreeSet<u64>,
}

impl IdAllocator {
    pub fn from_existing<I>(collection: &'static str, ids: I, start: u64) -> Result<Self, IdError>
    where
        I: IntoIterator<Item = u64>,
    {
        let used: BTreeSet<u64> = ids.into_iter().collect();
        let next = match used.iter().next_back() {
            Some(max) => max
                .checked_add(1)
                .ok_or(IdError::Exhausted { collection })?
                .max(start),
            None => start.max(1),
        };
        Ok(Self {
            collection,
            next,
            used,
        })
    }

    /// Hands out the next free identifier, or reserves `explicit` when given.
    pub fn assign(&mut self, explicit: Option<u64>) -> Result<u64, IdError> {
        match explicit {
            Some(id) => self.claim(id).map(|()| id),
            None => self.next_id(),
        }
    }

    pub fn next_id(&mut self) -> Result<u64, IdError> {
        let id = self.next;
        if self.used.contains(&id) {
            return Err(IdError::Collision {
                collection: self.collection,
                id,
            });
        }
        self.next = id.checked_add(1).ok_or(IdError::Exhausted {
            collection: self.collection,
        })?;
        self.used.insert(id);
        Ok(id)
    }

    /// Reserves a caller-chosen identifier.
    pub fn claim(&mut self, id: u64) -> Result<(), IdError> {
        if id == 0 || !self.used.insert(id) {
            return Err(IdError::Collision {
                collection: self.collection,
                id,
            });
        }
        if id >= self.next {
            self.next = id.checked_add(1).ok_or(IdError::Exhausted {
                collection: self.collection,
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    Collision { collection: &'static str, id: u64 },
    Exhausted { collection: &'static str },
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdError::Collision { collection, id } => {
                write!(f, "identifier {} already used in {}", id, collection)
            }
            IdError::Exhausted { collection } => {
                write!(f, "identifier space exhausted for {}", collection)
            }
        }
    }
}

impl Error for IdError {}

#[cfg(test)]
mod tests {
    use super::{IdAllocator, IdError};

    #[test]
    fn empty_collection_starts_at_configured_value() {
        let mut ids = IdAllocator::from_existing("problems", [], 1).unwrap();
        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.next_id().unwrap(), 2);

        let mut offset = IdAllocator::from_existing("problems", [], 100).unwrap();
        assert_eq!(offset.next_id().unwrap(), 100);
    }

    #[test]
    fn continues_after_max_even_when_unordered() {
        let mut ids = IdAllocator::from_existing("candidatures", [7, 2, 11, 3], 1).unwrap();
        let allocated: Vec<u64> = (0..4).map(|_| ids.next_id().unwrap()).collect();
        assert_eq!(allocated, vec![12, 13, 14, 15]);
        assert!(allocated.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn claim_rejects_collisions_and_moves_cursor() {
        let mut ids = IdAllocator::from_existing("projects", [1, 2], 1).unwrap();
        assert_eq!(
            ids.claim(2),
            Err(IdError::Collision {
                collection: "projects",
                id: 2
            })
        );
        ids.claim(10).expect("fresh id should be claimable");
        assert_eq!(ids.next_id().unwrap(), 11);
        ids.claim(5).expect("gap id should be claimable");
        assert!(ids.claim(5).is_err());
        assert!(ids.claim(0).is_err());
        assert_eq!(ids.assign(None).unwrap(), 12);
        assert_eq!(ids.assign(Some(40)).unwrap(), 40);
        assert_eq!(ids.assign(None).unwrap(), 41);
    }

    #[test]
    fn loaded_maximum_identifier_exhausts_the_sequence() {
        let err = IdAllocator::from_existing("problems", [3, u64::MAX], 1)
            .expect_err("no identifier exists past u64::MAX");
        assert_eq!(err, IdError::Exhausted { collection: "problems" });

        let mut ids = IdAllocator::from_existing("problems", [u64::MAX - 2], 1).unwrap();
        assert_eq!(ids.next_id().unwrap(), u64::MAX - 1);
        assert_eq!(
            ids.next_id(),
            Err(IdError::Exhausted { collection: "problems" })
        );
    }
}
