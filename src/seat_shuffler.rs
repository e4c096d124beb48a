//! Random seat assignment that remembers the roster order.

use rand::{seq::SliceRandom, Rng};

/// A roster plus a permutation telling which roster entry sits in which
/// seat: seat `i` is occupied by `roster[mapping[i]]`.
///
/// The mapping is always a permutation of `0..len`.
#[derive(Debug, Clone)]
pub struct SeatShuffler<T> {
    items: Vec<T>,
    mapping: Vec<usize>,
}

impl<T> SeatShuffler<T> {
    /// Seats follow roster order until the first [`shuffle`](Self::shuffle).
    pub fn new(items: Vec<T>) -> SeatShuffler<T> {
        let mapping = (0..items.len()).collect();
        SeatShuffler { items, mapping }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Occupant of `seat`.
    pub fn get(&self, seat: usize) -> Option<&T> {
        self.items.get(*self.mapping.get(seat)?)
    }

    pub fn get_mut(&mut self, seat: usize) -> Option<&mut T> {
        self.items.get_mut(*self.mapping.get(seat)?)
    }

    /// Occupants in seat order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.mapping.iter().map(|&i| &self.items[i])
    }

    /// Roster index of the occupant of `seat`.
    pub fn roster_index(&self, seat: usize) -> Option<usize> {
        self.mapping.get(seat).copied()
    }

    /// Items in roster order, whatever the current seating.
    pub fn roster(&self) -> &[T] {
        &self.items
    }

    pub fn roster_mut(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn mapping(&self) -> &[usize] {
        &self.mapping
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.mapping.shuffle(rng);
    }

    /// Back to roster order.
    pub fn unshuffle(&mut self) {
        for (seat, index) in self.mapping.iter_mut().enumerate() {
            *index = seat;
        }
    }

    pub fn is_identity(&self) -> bool {
        self.mapping.iter().enumerate().all(|(seat, &i)| seat == i)
    }

    /// Reorders roster-ordered values into seat order.
    pub fn shuffle_values<V: Clone>(&self, per_roster: &[V]) -> Vec<V> {
        self.mapping.iter().map(|&i| per_roster[i].clone()).collect()
    }

    /// Reorders seat-ordered values (e.g. tracker points) into roster
    /// order.
    pub fn unshuffle_values<V: Clone + Default>(&self, per_seat: &[V]) -> Vec<V> {
        let mut out = vec![V::default(); self.items.len()];
        for (seat, &index) in self.mapping.iter().enumerate() {
            if let Some(value) = per_seat.get(seat) {
                out[index] = value.clone();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn is_permutation(mapping: &[usize]) -> bool {
        let mut sorted = mapping.to_vec();
        sorted.sort_unstable();
        sorted.into_iter().eq(0..mapping.len())
    }

    #[test]
    fn seats_follow_mapping() {
        let mut seats = SeatShuffler::new(vec!["a", "b", "c", "d"]);
        let mut rng = StdRng::seed_from_u64(7);
        seats.shuffle(&mut rng);
        for seat in 0..seats.len() {
            let index = seats.roster_index(seat).unwrap();
            assert_eq!(seats.get(seat), Some(&seats.roster()[index]));
        }
        assert_eq!(seats.iter().count(), 4);
        assert!(seats.get(4).is_none());
    }

    #[test]
    fn shuffle_then_unshuffle_is_identity() {
        let mut rng = StdRng::seed_from_u64(42);
        for len in 0..8 {
            let mut seats = SeatShuffler::new((0..len).collect::<Vec<_>>());
            for _ in 0..20 {
                seats.shuffle(&mut rng);
                assert!(is_permutation(seats.mapping()));
            }
            seats.unshuffle();
            assert!(seats.is_identity());
            assert!(seats.iter().copied().eq(0..len));
        }
    }

    #[test]
    fn values_map_back_to_roster_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let roster_points = vec![10u32, 20, 30, 40, 50];
        let mut seats = SeatShuffler::new(vec!['v', 'w', 'x', 'y', 'z']);
        for _ in 0..50 {
            seats.shuffle(&mut rng);
            let per_seat = seats.shuffle_values(&roster_points);
            for (seat, points) in per_seat.iter().enumerate() {
                assert_eq!(*points, roster_points[seats.mapping()[seat]]);
            }
            assert_eq!(seats.unshuffle_values(&per_seat), roster_points);
        }
    }

    #[test]
    fn mutable_access_reaches_the_occupant() {
        let mut seats = SeatShuffler::new(vec![0, 0, 0]);
        seats.shuffle(&mut StdRng::seed_from_u64(1));
        let index = seats.roster_index(2).unwrap();
        *seats.get_mut(2).unwrap() = 9;
        assert_eq!(seats.roster()[index], 9);
        seats.roster_mut()[index] = 1;
        assert_eq!(seats.get(2), Some(&1));
    }
}
