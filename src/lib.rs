pub mod io;
pub mod resolution;
pub mod settings;
