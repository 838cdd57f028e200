pub mod defect;
pub mod geometry;
pub mod io;
pub mod linkcell;
pub mod model;
pub mod trap;
pub mod tungsten;
