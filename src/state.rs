use std::ops::Range;

use smallvec::SmallVec;

use crate::board::Cell;
use crate::error::SolveError;

/// Largest number of atoms a puzzle may have.
pub const MAX_ATOMS: usize = 32;

/// Positions of every atom, indexed by atom. Atoms of the same group are kept
/// sorted by position (canonical form).
pub type Placement = SmallVec<[Cell; 16]>;

/// Partition of the atom indices into contiguous groups of interchangeable
/// atoms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtomGroups {
    group_of: Vec<usize>,
    begin: Vec<usize>,
    sizes: Vec<usize>,
}

impl AtomGroups {
    /// Groups laid out back to back: the first `sizes[0]` atoms form group 0,
    /// the next `sizes[1]` group 1, and so on.
    pub fn new(sizes: &[usize]) -> Result<Self, SolveError> {
        if sizes.iter().any(|&s| s == 0) {
            return Err(SolveError::InvalidPuzzle("empty atom group".into()));
        }
        let atoms: usize = sizes.iter().sum();
        if atoms == 0 {
            return Err(SolveError::InvalidPuzzle("puzzle has no atoms".into()));
        }
        if atoms > MAX_ATOMS {
            return Err(SolveError::ConfigurationOverflow {
                what: "atom count",
                value: atoms as u64,
                limit: MAX_ATOMS as u64,
            });
        }

        let mut group_of = Vec::with_capacity(atoms);
        let mut begin = Vec::with_capacity(sizes.len());
        for (group, &size) in sizes.iter().enumerate() {
            begin.push(group_of.len());
            group_of.extend(std::iter::repeat(group).take(size));
        }
        Ok(AtomGroups {
            group_of,
            begin,
            sizes: sizes.to_vec(),
        })
    }

    pub fn singletons(atoms: usize) -> Result<Self, SolveError> {
        AtomGroups::new(&vec![1; atoms])
    }

    #[inline(always)]
    pub fn atom_count(&self) -> usize {
        self.group_of.len()
    }

    #[inline(always)]
    pub fn group_count(&self) -> usize {
        self.sizes.len()
    }

    #[inline(always)]
    pub fn group_of(&self, atom: usize) -> usize {
        self.group_of[atom]
    }

    #[inline(always)]
    pub fn group_size(&self, group: usize) -> usize {
        self.sizes[group]
    }

    #[inline(always)]
    pub fn range(&self, group: usize) -> Range<usize> {
        self.begin[group]..self.begin[group] + self.sizes[group]
    }

    /// Atom index range of the group containing `atom`.
    #[inline(always)]
    pub fn range_of_atom(&self, atom: usize) -> Range<usize> {
        self.range(self.group_of[atom])
    }

    pub fn canonicalize(&self, positions: &mut [Cell]) {
        for group in 0..self.group_count() {
            if self.sizes[group] > 1 {
                positions[self.range(group)].sort_unstable();
            }
        }
    }

    /// Restores canonical order after only `atom` has moved.
    #[inline]
    pub fn canonicalize_atom(&self, positions: &mut [Cell], atom: usize) {
        let group = self.group_of[atom];
        if self.sizes[group] > 1 {
            positions[self.range(group)].sort_unstable();
        }
    }

    pub fn is_canonical(&self, positions: &[Cell]) -> bool {
        (0..self.group_count()).all(|g| positions[self.range(g)].windows(2).all(|w| w[0] <= w[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_layout() {
        let groups = AtomGroups::new(&[1, 1, 3, 2]).unwrap();
        assert_eq!(groups.atom_count(), 7);
        assert_eq!(groups.group_count(), 4);
        assert_eq!(groups.range(2), 2..5);
        assert_eq!(groups.range_of_atom(6), 5..7);
        assert_eq!(groups.group_of(4), 2);
    }

    #[test]
    fn test_groups_reject_bad_partitions() {
        assert!(matches!(AtomGroups::new(&[1, 0]), Err(SolveError::InvalidPuzzle(_))));
        assert!(matches!(AtomGroups::new(&[]), Err(SolveError::InvalidPuzzle(_))));
        assert!(matches!(
            AtomGroups::new(&[MAX_ATOMS, 1]),
            Err(SolveError::ConfigurationOverflow { .. })
        ));
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let groups = AtomGroups::new(&[1, 3, 2]).unwrap();
        let mut positions: Placement = SmallVec::from_slice(&[9, 7, 2, 5, 4, 1]);
        groups.canonicalize(&mut positions);
        assert_eq!(positions.as_slice(), &[9, 2, 5, 7, 1, 4]);
        assert!(groups.is_canonical(&positions));

        let before = positions.clone();
        groups.canonicalize(&mut positions);
        assert_eq!(positions, before);
    }

    #[test]
    fn test_canonicalize_merges_permutations() {
        let groups = AtomGroups::new(&[3]).unwrap();
        let perms: [[Cell; 3]; 6] = [
            [3, 8, 11],
            [3, 11, 8],
            [8, 3, 11],
            [8, 11, 3],
            [11, 3, 8],
            [11, 8, 3],
        ];
        for p in perms {
            let mut positions = p;
            groups.canonicalize(&mut positions);
            assert_eq!(positions, [3, 8, 11]);
        }
    }

    #[test]
    fn test_canonicalize_atom_only_touches_its_group() {
        let groups = AtomGroups::new(&[2, 2]).unwrap();
        let mut positions = [6, 2, 9, 4];
        groups.canonicalize_atom(&mut positions, 1);
        assert_eq!(positions, [2, 6, 9, 4]);
    }
}
