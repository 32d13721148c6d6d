/// Stateful block effect.
/// - `block` is interleaved f32 samples, `channels` per frame.
/// - state persists across `process` calls until `reset` or `prepare`.
pub trait Effect: Send {
    /// Size internal buffers for a sample rate and channel count. Clears state.
    fn prepare(&mut self, sample_rate: u32, channels: usize);
    /// Discard all decay/feedback state without reallocating.
    fn reset(&mut self);
    fn process(&mut self, block: &mut [f32]);
}
