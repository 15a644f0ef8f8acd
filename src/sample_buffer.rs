//! FIFO buffer for transporting audio between pipeline stages
//!
//! Samples are 64-bit floats nominally in [-1.0, 1.0]; nothing clips
//! mid-pipeline. Out-of-range requests clamp to the data available, so an
//! empty buffer yields empty results instead of panicking.

use crate::utils::math::lerp;

/// FIFO of audio samples with the slice, mix and crossfade operations the
/// pipeline stages need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBuffer {
    data: Vec<f64>,
}

impl SampleBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Create a buffer owning the given samples
    pub fn from_samples(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Number of samples currently buffered
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no samples are buffered
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only view of the buffered samples
    pub fn samples(&self) -> &[f64] {
        &self.data
    }

    /// Push a single sample onto the tail
    pub fn push_sample(&mut self, sample: f64) {
        self.data.push(sample);
    }

    /// Append the given samples to the tail
    pub fn append(&mut self, samples: &[f64]) {
        self.data.extend_from_slice(samples);
    }

    /// Append `count` samples of silence (0.0)
    pub fn append_silence(&mut self, count: usize) {
        self.data.resize(self.data.len() + count, 0.0);
    }

    /// Copy out up to `count` samples from the head without removing them
    pub fn retrieve(&self, count: usize) -> Vec<f64> {
        let count = count.min(self.data.len());
        self.data[..count].to_vec()
    }

    /// Copy out up to `count` samples starting at `start`, clamped to the
    /// buffered range
    pub fn retrieve_from(&self, start: usize, count: usize) -> Vec<f64> {
        let start = start.min(self.data.len());
        let end = start.saturating_add(count).min(self.data.len());
        self.data[start..end].to_vec()
    }

    /// Remove and return up to `count` samples from the head
    pub fn retrieve_remove(&mut self, count: usize) -> Vec<f64> {
        let count = count.min(self.data.len());
        self.data.drain(..count).collect()
    }

    /// Drop up to `count` samples from the head
    pub fn remove_front_samples(&mut self, count: usize) {
        let count = count.min(self.data.len());
        self.data.drain(..count);
    }

    /// Drop samples from the tail so that `new_len` remain
    pub fn truncate(&mut self, new_len: usize) {
        self.data.truncate(new_len);
    }

    /// Sample-wise add the other buffer starting at offset zero. The result
    /// length is the longer of the two.
    pub fn mix_in(&mut self, other: &[f64]) {
        if other.len() > self.data.len() {
            self.data.resize(other.len(), 0.0);
        }
        for (sample, &incoming) in self.data.iter_mut().zip(other) {
            *sample += incoming;
        }
    }

    /// Move the last `count` samples into `target`, removing them here
    pub fn move_last_samples(&mut self, count: usize, target: &mut SampleBuffer) {
        let count = count.min(self.data.len());
        let split = self.data.len() - count;
        target.data.extend(self.data.drain(split..));
    }

    /// Empty the buffer
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Scale every sample by `ratio` in place
    pub fn amplify(&mut self, ratio: f64) {
        for sample in &mut self.data {
            *sample *= ratio;
        }
    }

    /// Scale samples by a per-sample linear ramp from `begin_ratio` at the
    /// head to `end_ratio` at the tail
    pub fn amplify_ramp(&mut self, begin_ratio: f64, end_ratio: f64) {
        let len = self.data.len();
        if len == 0 {
            return;
        }
        if len == 1 {
            self.data[0] *= begin_ratio;
            return;
        }
        let last = (len - 1) as f64;
        for (i, sample) in self.data.iter_mut().enumerate() {
            *sample *= lerp(begin_ratio, end_ratio, i as f64 / last);
        }
    }
}

/// Linearly crossfade `fade_out` (level 1 -> 0) with `fade_in` (level 0 -> 1).
///
/// Mixing starts at sample zero of both inputs and runs over the shorter
/// length; the result has exactly that length.
pub fn linear_crossfade(fade_out: &[f64], fade_in: &[f64]) -> Vec<f64> {
    let len = fade_out.len().min(fade_in.len());
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![fade_out[0]];
    }
    let last = (len - 1) as f64;
    (0..len)
        .map(|i| {
            let t = i as f64 / last;
            fade_out[i] * (1.0 - t) + fade_in[i] * t
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_retrieve() {
        let mut buffer = SampleBuffer::new();
        buffer.append(&[0.1, 0.2, 0.3]);
        buffer.push_sample(0.4);

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.retrieve(2), vec![0.1, 0.2]);
        // Peek does not consume
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.retrieve_from(1, 2), vec![0.2, 0.3]);
    }

    #[test]
    fn test_retrieve_remove_consumes_head() {
        let mut buffer = SampleBuffer::from_samples(vec![1.0, 2.0, 3.0]);
        assert_eq!(buffer.retrieve_remove(2), vec![1.0, 2.0]);
        assert_eq!(buffer.samples(), &[3.0]);
    }

    #[test]
    fn test_out_of_range_requests_clamp() {
        let mut buffer = SampleBuffer::from_samples(vec![1.0]);
        assert_eq!(buffer.retrieve(10), vec![1.0]);
        assert_eq!(buffer.retrieve_from(5, 10), Vec::<f64>::new());
        assert_eq!(buffer.retrieve_remove(10), vec![1.0]);
        assert!(buffer.is_empty());

        buffer.remove_front_samples(100);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_append_silence() {
        let mut buffer = SampleBuffer::new();
        buffer.append_silence(3);
        assert_eq!(buffer.samples(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mix_in_extends_to_longer_input() {
        let mut buffer = SampleBuffer::from_samples(vec![0.5, 0.5]);
        buffer.mix_in(&[0.25, 0.25, 0.25]);
        assert_eq!(buffer.samples(), &[0.75, 0.75, 0.25]);
    }

    #[test]
    fn test_move_last_samples() {
        let mut source = SampleBuffer::from_samples(vec![1.0, 2.0, 3.0, 4.0]);
        let mut target = SampleBuffer::from_samples(vec![9.0]);
        source.move_last_samples(2, &mut target);

        assert_eq!(source.samples(), &[1.0, 2.0]);
        assert_eq!(target.samples(), &[9.0, 3.0, 4.0]);
    }

    #[test]
    fn test_truncate() {
        let mut buffer = SampleBuffer::from_samples(vec![1.0, 2.0, 3.0]);
        buffer.truncate(1);
        assert_eq!(buffer.samples(), &[1.0]);
    }

    #[test]
    fn test_amplify() {
        let mut buffer = SampleBuffer::from_samples(vec![0.5, -0.5]);
        buffer.amplify(2.0);
        assert_eq!(buffer.samples(), &[1.0, -1.0]);
    }

    #[test]
    fn test_amplify_ramp_endpoints() {
        let mut buffer = SampleBuffer::from_samples(vec![1.0, 1.0, 1.0]);
        buffer.amplify_ramp(0.0, 1.0);
        assert_eq!(buffer.samples(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_linear_crossfade_ramps() {
        let fade_out = vec![1.0; 5];
        let fade_in = vec![1.0; 5];
        let mixed = linear_crossfade(&fade_out, &fade_in);

        // Constant equal inputs crossfade to the same constant
        assert_eq!(mixed.len(), 5);
        for sample in mixed {
            assert!((sample - 1.0).abs() < 1e-12);
        }

        let silent = vec![0.0; 3];
        let loud = vec![1.0; 3];
        let mixed = linear_crossfade(&loud, &silent);
        assert_eq!(mixed[0], 1.0);
        assert_eq!(mixed[2], 0.0);
    }

    #[test]
    fn test_linear_crossfade_uses_shorter_length() {
        let mixed = linear_crossfade(&[1.0, 1.0, 1.0, 1.0], &[0.0, 0.0]);
        assert_eq!(mixed.len(), 2);
    }
}
