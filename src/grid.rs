//! CPU cell linked lists: `CellHeads` and `NextIndex`.
//!
//! Both arrays are plain integer arenas. `heads[c]` is one particle filed in
//! cell `c` (or [`EMPTY_CELL`]) and `next[i]` is the next particle sharing
//! `i`'s cell. Clearing runs one task per cell and building one task per
//! particle on the rayon pool; the single contested operation is the atomic
//! swap on a cell head. Everything else each task touches is disjoint.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;
use rayon::prelude::*;

use crate::particle::Particle;
use crate::spatial::{GridLayout, EMPTY_CELL};

/// Per-cell singly linked lists over particle indices.
#[derive(Debug)]
pub struct CellGrid {
    heads: Vec<AtomicU32>,
    next: Vec<AtomicU32>,
}

impl CellGrid {
    pub fn new(cell_count: usize, particle_count: usize) -> Self {
        Self {
            heads: (0..cell_count).map(|_| AtomicU32::new(EMPTY_CELL)).collect(),
            next: (0..particle_count).map(|_| AtomicU32::new(EMPTY_CELL)).collect(),
        }
    }

    /// Resize both arenas. Contents are reset to the sentinel.
    pub fn resize(&mut self, cell_count: usize, particle_count: usize) {
        *self = Self::new(cell_count, particle_count);
    }

    pub fn cell_count(&self) -> usize {
        self.heads.len()
    }

    pub fn particle_capacity(&self) -> usize {
        self.next.len()
    }

    /// Phase 1: every head back to empty.
    pub fn clear(&self) {
        self.heads.par_iter().for_each(|head| head.store(EMPTY_CELL, Ordering::Relaxed));
    }

    /// Phase 2: file every particle into its cell. Within-cell order is
    /// whatever the interleaving produced and must not be relied upon.
    ///
    /// Only the first `particle_capacity()` particles are filed.
    pub fn build(&self, particles: &[Particle], layout: &GridLayout) {
        let count = particles.len().min(self.next.len());
        particles[..count]
            .par_iter()
            .enumerate()
            .for_each(|(i, p)| self.insert(i as u32, p.position(), layout));
    }

    /// Push `index` onto the head of its cell's list.
    ///
    /// Cross-phase visibility comes from the rayon join that ends the build
    /// phase, so relaxed ordering is enough; the swap itself is what keeps
    /// concurrent inserts into one cell from losing entries.
    #[inline]
    pub fn insert(&self, index: u32, position: Vec3, layout: &GridLayout) {
        let cell = layout.cell_index(position);
        let previous = self.heads[cell].swap(index, Ordering::Relaxed);
        self.next[index as usize].store(previous, Ordering::Relaxed);
    }

    #[inline]
    pub fn head(&self, cell: usize) -> u32 {
        self.heads[cell].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn next(&self, index: u32) -> u32 {
        self.next[index as usize].load(Ordering::Relaxed)
    }

    /// Walk the list of `cell`.
    pub fn cell_iter(&self, cell: usize) -> CellIter<'_> {
        CellIter {
            grid: self,
            cursor: self.head(cell),
            remaining: self.next.len(),
        }
    }

    /// Snapshot of the head array, for inspection and tests.
    pub fn heads_snapshot(&self) -> Vec<u32> {
        self.heads.iter().map(|h| h.load(Ordering::Relaxed)).collect()
    }

    /// Snapshot of the next array, for inspection and tests.
    pub fn next_snapshot(&self) -> Vec<u32> {
        self.next.iter().map(|n| n.load(Ordering::Relaxed)).collect()
    }
}

/// Iterator over the particle indices filed in one cell.
///
/// Stops after at most `particle_capacity()` steps even if the lists were
/// corrupted into a cycle.
pub struct CellIter<'a> {
    grid: &'a CellGrid,
    cursor: u32,
    remaining: usize,
}

impl Iterator for CellIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.cursor == EMPTY_CELL || self.remaining == 0 {
            return None;
        }
        let current = self.cursor;
        self.cursor = self.grid.next(current);
        self.remaining -= 1;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::WorldBounds;
    use glam::Vec4;

    fn particle_at(p: Vec3) -> Particle {
        Particle::new(p, Vec3::X, Vec4::ONE)
    }

    #[test]
    fn test_clear_resets_heads() {
        let layout = GridLayout::new(WorldBounds::default(), 2.0, 0);
        let grid = CellGrid::new(layout.cell_count() as usize, 2);
        grid.build(&[particle_at(Vec3::ZERO), particle_at(Vec3::ONE)], &layout);
        assert!(grid.heads_snapshot().iter().any(|&h| h != EMPTY_CELL));

        grid.clear();
        assert!(grid.heads_snapshot().iter().all(|&h| h == EMPTY_CELL));
    }

    #[test]
    fn test_two_particles_share_a_cell() {
        let layout = GridLayout::new(WorldBounds::default(), 2.0, 0);
        let grid = CellGrid::new(layout.cell_count() as usize, 2);
        grid.clear();
        grid.build(&[particle_at(Vec3::splat(0.1)), particle_at(Vec3::splat(0.2))], &layout);

        let cell = layout.cell_index(Vec3::splat(0.1));
        let mut members: Vec<u32> = grid.cell_iter(cell).collect();
        members.sort_unstable();
        assert_eq!(members, vec![0, 1]);
    }

    #[test]
    fn test_empty_cell_iterates_nothing() {
        let grid = CellGrid::new(8, 4);
        grid.clear();
        assert_eq!(grid.cell_iter(3).count(), 0);
    }

    #[test]
    fn test_iter_is_bounded_on_cycle() {
        let grid = CellGrid::new(1, 2);
        grid.heads[0].store(0, Ordering::Relaxed);
        grid.next[0].store(1, Ordering::Relaxed);
        grid.next[1].store(0, Ordering::Relaxed);
        assert_eq!(grid.cell_iter(0).count(), 2);
    }
}
