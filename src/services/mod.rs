pub mod extras;
pub mod preflight;
pub mod prompt;
pub mod users;
pub mod xml;
