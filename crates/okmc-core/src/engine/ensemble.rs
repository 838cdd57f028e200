use crate::core::defect::Defect;
use std::collections::BTreeMap;

/// Number of objects of one kind and the sum of their sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindTally {
    pub objects: usize,
    pub units: u64,
}

/// The live defects, densely indexed `0..len()`, together with each object's cached share of
/// the interaction energy.
///
/// Removing an object shifts every later index down by one. The ensemble itself knows nothing
/// about the spatial index or the rate table; `DefectSystem` keeps those in step.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble<K: Ord> {
    defects: Vec<Defect<K>>,
    energies: Vec<f64>,
    tallies: BTreeMap<K, KindTally>,
}

impl<K: Copy + Ord> Default for Ensemble<K> {
    fn default() -> Self {
        Self {
            defects: Vec::new(),
            energies: Vec::new(),
            tallies: BTreeMap::new(),
        }
    }
}

impl<K: Copy + Ord> Ensemble<K> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.defects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.defects.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Defect<K>> {
        self.defects.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Defect<K>> {
        self.defects.iter()
    }

    pub fn defects(&self) -> &[Defect<K>] {
        &self.defects
    }

    #[inline]
    pub fn energy(&self, index: usize) -> Option<f64> {
        self.energies.get(index).copied()
    }

    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Sum of the per-object energy shares.
    pub fn total_energy(&self) -> f64 {
        self.energies.iter().sum()
    }

    pub fn tallies(&self) -> &BTreeMap<K, KindTally> {
        &self.tallies
    }

    /// Appends `defect` with a zero energy share and returns its index.
    pub fn push(&mut self, defect: Defect<K>) -> usize {
        self.count_in(&defect);
        self.defects.push(defect);
        self.energies.push(0.0);
        self.defects.len() - 1
    }

    /// Swaps the defect at `index` for `defect`, returning the old one. The energy share is left
    /// for the caller to refresh.
    pub fn replace(&mut self, index: usize, defect: Defect<K>) -> Option<Defect<K>> {
        if index >= self.defects.len() {
            return None;
        }
        self.count_in(&defect);
        let slot = self.defects.get_mut(index)?;
        let old = std::mem::replace(slot, defect);
        self.count_out(&old);
        Some(old)
    }

    /// Removes and returns the defect at `index`, shifting later indices down.
    pub fn remove(&mut self, index: usize) -> Option<Defect<K>> {
        if index >= self.defects.len() {
            return None;
        }
        self.energies.remove(index);
        let defect = self.defects.remove(index);
        self.count_out(&defect);
        Some(defect)
    }

    /// Inserts `defect` at `index` with a zero energy share, shifting later indices up. An index
    /// past the end appends.
    pub fn insert(&mut self, index: usize, defect: Defect<K>) {
        let index = index.min(self.defects.len());
        self.count_in(&defect);
        self.defects.insert(index, defect);
        self.energies.insert(index, 0.0);
    }

    pub fn set_energy(&mut self, index: usize, energy: f64) {
        if let Some(slot) = self.energies.get_mut(index) {
            *slot = energy;
        }
    }

    /// Empties the ensemble, handing back the defects in index order.
    pub fn drain(&mut self) -> Vec<Defect<K>> {
        self.energies.clear();
        self.tallies.clear();
        std::mem::take(&mut self.defects)
    }

    fn count_in(&mut self, defect: &Defect<K>) {
        let tally = self.tallies.entry(defect.kind()).or_default();
        tally.objects += 1;
        tally.units += u64::from(defect.size());
    }

    fn count_out(&mut self, defect: &Defect<K>) {
        if let Some(tally) = self.tallies.get_mut(&defect.kind()) {
            tally.objects -= 1;
            tally.units -= u64::from(defect.size());
            if tally.objects == 0 {
                self.tallies.remove(&defect.kind());
            }
        }
    }
}
