//! Small internal helpers.

pub(crate) mod clock;
pub(crate) mod sync;
