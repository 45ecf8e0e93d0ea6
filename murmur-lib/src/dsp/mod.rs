//! Pure numeric building blocks: the pan law, the breathing waveform and
//! random pan walk stepping.

pub mod breathing;
pub mod pan;
pub mod pan_walk;
