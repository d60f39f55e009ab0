pub mod elapsed;
pub mod simulate;
