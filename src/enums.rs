use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [Self::Axial, Self::Coronal, Self::Sagittal];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Axial => "axial",
            Self::Coronal => "coronal",
            Self::Sagittal => "sagittal",
        }
    }
}

/// Density of the hemisphere direction table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionSampling {
    /// 81 directions
    Coarse,
    /// 321 directions
    #[default]
    Fine,
}
