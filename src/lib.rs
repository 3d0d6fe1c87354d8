pub mod allocation;
pub mod demand;
pub mod diagnostics;
pub mod envelope;
pub mod finder;
pub mod params;
pub mod partition;
pub mod polar_sector;
pub mod ring;
pub mod sector_group;
pub mod seed;
pub mod site;
