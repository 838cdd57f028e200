pub mod descriptor;
pub mod steptime;
