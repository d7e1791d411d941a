pub mod io;
pub mod version;
