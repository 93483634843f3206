use crate::core::models::attachment::{ApClass, BondType};
use crate::core::models::vertex::PayloadAtom;
use nalgebra::Vector3;

/// Describes one attachment point of a building block.
#[derive(Debug, Clone, PartialEq)]
pub struct ApDescriptor {
    pub class: ApClass,
    pub bond_type: BondType,
    /// Bond direction in the block's local frame.
    pub direction: Vector3<f64>,
    /// Index of the payload atom this AP sprouts from.
    pub anchor: usize,
}

/// A reusable vertex definition drawn from a library.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildingBlock {
    pub atoms: Vec<PayloadAtom>,
    pub bonds: Vec<(usize, usize, BondType)>,
    pub aps: Vec<ApDescriptor>,
}

impl BuildingBlock {
    /// APs whose class matches under the given predicate.
    pub fn ap_indices_where<F: Fn(&ApClass) -> bool>(&self, pred: F) -> Vec<usize> {
        self.aps
            .iter()
            .enumerate()
            .filter(|(_, d)| pred(&d.class))
            .map(|(i, _)| i)
            .collect()
    }
}
