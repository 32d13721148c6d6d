pub mod comb;
pub mod effect;
pub mod reverb;
