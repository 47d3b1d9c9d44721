//! Per-channel overlap-add queue on the resynthesis worker.

/// Append-only overlap-add buffer with a consumption cursor.
///
/// Each synthesized frame overlaps the previous one by `frame_len - hop`
/// samples. Only samples that no later frame can still add to are
/// *finalized* and may be consumed; the overlapping tail stays behind the
/// cursor until the next frame lands.
#[derive(Debug, Clone)]
pub struct ResynthesisQueue {
    samples: Vec<f32>,
    consumed: usize,
    frame_len: usize,
    hop: usize,
}

impl ResynthesisQueue {
    pub fn new(frame_len: usize, hop: usize) -> Self {
        assert!(hop > 0 && hop <= frame_len, "hop must be in 1..=frame_len");
        Self {
            samples: Vec::with_capacity(crate::COMPACTION_THRESHOLD + 4 * frame_len),
            consumed: 0,
            frame_len,
            hop,
        }
    }

    /// Samples appended since the last compaction, including the open tail.
    #[inline]
    pub fn produced(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Produced but not yet consumed.
    #[inline]
    pub fn pending(&self) -> usize {
        self.samples.len() - self.consumed
    }

    /// Samples that can be consumed right now.
    #[inline]
    pub fn ready(&self) -> usize {
        self.finalized() - self.consumed
    }

    fn finalized(&self) -> usize {
        self.samples.len().saturating_sub(self.frame_len - self.hop)
    }

    /// Overlap-add one synthesized frame.
    ///
    /// The first frame is appended whole. Later frames sum their leading
    /// `frame_len - hop` samples into the tail and append the trailing `hop`.
    pub fn overlap_add(&mut self, frame: &[f32]) {
        debug_assert_eq!(frame.len(), self.frame_len);

        if self.samples.is_empty() {
            self.samples.extend_from_slice(frame);
            return;
        }

        let overlap = self.frame_len - self.hop;
        let tail_start = self.samples.len() - overlap;
        for (dst, src) in self.samples[tail_start..].iter_mut().zip(&frame[..overlap]) {
            *dst += *src;
        }
        self.samples.extend_from_slice(&frame[overlap..]);
    }

    /// Advance the cursor by up to `max` finalized samples and return them.
    pub fn consume(&mut self, max: usize) -> &[f32] {
        let n = max.min(self.ready());
        let start = self.consumed;
        self.consumed += n;
        &self.samples[start..start + n]
    }

    pub fn should_compact(&self) -> bool {
        self.consumed > crate::COMPACTION_THRESHOLD
    }

    /// Drop the consumed prefix and reset the cursor.
    pub fn compact(&mut self) {
        self.samples.drain(..self.consumed);
        self.consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FRAME: usize = 8;
    const HOP: usize = 2;

    #[test]
    fn test_first_frame_is_appended_whole() {
        let mut queue = ResynthesisQueue::new(FRAME, HOP);
        queue.overlap_add(&[1.0; FRAME]);

        assert_eq!(queue.produced(), FRAME);
        // Only the first hop is final; the rest overlaps the next frame.
        assert_eq!(queue.ready(), HOP);
    }

    #[test]
    fn test_overlap_sums_into_tail() {
        let mut queue = ResynthesisQueue::new(FRAME, HOP);
        queue.overlap_add(&[1.0; FRAME]);
        queue.overlap_add(&[1.0; FRAME]);

        assert_eq!(queue.produced(), FRAME + HOP);
        let out = queue.consume(usize::MAX).to_vec();
        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_steady_state_overlap_count() {
        let mut queue = ResynthesisQueue::new(FRAME, HOP);
        for _ in 0..10 {
            queue.overlap_add(&[1.0; FRAME]);
        }
        let out = queue.consume(usize::MAX).to_vec();
        // After the ramp-up every sample is covered by FRAME / HOP frames.
        assert!(out[FRAME..].iter().all(|&s| s == (FRAME / HOP) as f32));
    }

    #[test]
    fn test_consume_never_passes_ready() {
        let mut queue = ResynthesisQueue::new(FRAME, HOP);
        queue.overlap_add(&[0.5; FRAME]);

        assert_eq!(queue.consume(100).len(), HOP);
        assert!(queue.consume(100).is_empty());
        assert_eq!(queue.pending(), FRAME - HOP);
    }

    #[test]
    fn test_compact_keeps_unconsumed_tail() {
        let mut queue = ResynthesisQueue::new(FRAME, HOP);
        let ramp: Vec<f32> = (0..FRAME).map(|i| i as f32).collect();
        queue.overlap_add(&ramp);
        queue.overlap_add(&[0.0; FRAME]);
        queue.consume(3);

        let before = queue.samples[3..].to_vec();
        queue.compact();

        assert_eq!(queue.consumed(), 0);
        assert_eq!(queue.samples, before);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Produce(f32),
        Consume(usize),
        Compact,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-1.0f32..1.0).prop_map(Op::Produce),
            (0usize..12).prop_map(Op::Consume),
            Just(Op::Compact),
        ]
    }

    proptest! {
        #[test]
        fn consumed_never_exceeds_produced(ops in prop::collection::vec(op(), 0..200)) {
            let mut queue = ResynthesisQueue::new(FRAME, HOP);
            // Reference queue that is never compacted.
            let mut reference = ResynthesisQueue::new(FRAME, HOP);

            for op in ops {
                match op {
                    Op::Produce(value) => {
                        let frame: Vec<f32> = (0..FRAME).map(|i| value + i as f32).collect();
                        queue.overlap_add(&frame);
                        reference.overlap_add(&frame);
                    }
                    Op::Consume(n) => {
                        let got = queue.consume(n).to_vec();
                        let expected = reference.consume(n).to_vec();
                        prop_assert_eq!(got, expected);
                    }
                    Op::Compact => queue.compact(),
                }
                prop_assert!(queue.consumed() <= queue.produced());
                prop_assert_eq!(queue.ready(), reference.ready());
            }
        }
    }
}
