use crate::core::model::{Polarity, Shape};
use phf::{Map, phf_map};
use std::fmt;

/// Defect species of the bcc tungsten model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Species {
    I,
    V,
    ICluster,
    VCluster,
    ILoop111,
}

static SPECIES_NAMES: Map<&'static str, Species> = phf_map! {
    "I" => Species::I,
    "V" => Species::V,
    "ICluster" => Species::ICluster,
    "VCluster" => Species::VCluster,
    "ILoop111" => Species::ILoop111,
};

impl Species {
    pub const ALL: [Species; 5] = [
        Species::I,
        Species::V,
        Species::ICluster,
        Species::VCluster,
        Species::ILoop111,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        SPECIES_NAMES.get(name.trim()).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Species::I => "I",
            Species::V => "V",
            Species::ICluster => "ICluster",
            Species::VCluster => "VCluster",
            Species::ILoop111 => "ILoop111",
        }
    }

    #[inline]
    pub fn polarity(&self) -> Polarity {
        match self {
            Species::I | Species::ICluster | Species::ILoop111 => Polarity::Interstitial,
            Species::V | Species::VCluster => Polarity::Vacancy,
        }
    }

    /// Interstitial objects are modelled as ⟨111⟩ disks, vacancy objects as spheres.
    #[inline]
    pub fn shape(&self) -> Shape {
        match self.polarity() {
            Polarity::Interstitial => Shape::Disk,
            Polarity::Vacancy => Shape::Sphere,
        }
    }

    /// Whether the species carries a Burgers direction.
    #[inline]
    pub fn is_oriented(&self) -> bool {
        self.shape() == Shape::Disk
    }

    /// The member of this species' family that holds `size` point defects.
    pub fn with_size(&self, size: u32) -> Species {
        match (self.polarity(), size) {
            (Polarity::Interstitial, 0..=1) => Species::I,
            (Polarity::Interstitial, 2..=3) => Species::ICluster,
            (Polarity::Interstitial, _) => Species::ILoop111,
            (Polarity::Vacancy, 0..=1) => Species::V,
            (Polarity::Vacancy, _) => Species::VCluster,
        }
    }

    /// The single point defect of this species' family.
    #[inline]
    pub fn point(&self) -> Species {
        self.with_size(1)
    }

    /// Whether `size` lies in the range this species describes.
    pub fn accepts_size(&self, size: u32) -> bool {
        size > 0 && self.with_size(size) == *self
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
