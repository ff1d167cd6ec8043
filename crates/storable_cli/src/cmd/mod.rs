/// Image conversion command.
pub mod convert;
/// Decoded graph printing command.
pub mod dump;
/// Header and statistics command.
pub mod info;

mod util;
