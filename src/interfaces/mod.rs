pub mod notion;
pub mod slack;
