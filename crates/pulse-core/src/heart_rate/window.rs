//! Rolling window of accepted instantaneous heart rates

/// Fixed-capacity ring buffer of instantaneous BPM readings.
///
/// Slots start at 0, which marks "empty" and is skipped when averaging. Once
/// full, each new reading overwrites the oldest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow<const N: usize> {
    slots: [u32; N],
    next: usize,
}

impl<const N: usize> Default for RateWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RateWindow<N> {
    pub const fn new() -> Self {
        Self {
            slots: [0; N],
            next: 0,
        }
    }

    pub fn push(&mut self, bpm: u32) {
        self.slots[self.next] = bpm;
        self.next = (self.next + 1) % N;
    }

    /// Integer mean of the occupied slots, or 0 when nothing has been recorded.
    pub fn average(&self) -> u32 {
        let (total, count) = self
            .slots
            .iter()
            .filter(|&&bpm| bpm != 0)
            .fold((0u64, 0u64), |(total, count), &bpm| {
                (total + u64::from(bpm), count + 1)
            });

        if count == 0 {
            return 0;
        }
        (total / count) as u32
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|&&bpm| bpm != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Raw slot contents in storage order.
    pub fn slots(&self) -> &[u32; N] {
        &self.slots
    }
}
