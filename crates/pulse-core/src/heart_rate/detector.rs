//! Beat detection on the raw infrared waveform
//!
//! [`PbaBeatDetector`] removes the DC level with an exponential average,
//! smooths the remainder with a symmetric low-pass FIR, and reports a beat on
//! each rising zero crossing whose preceding swing has a plausible amplitude.

/// Something that turns a stream of intensity samples into beat signals.
pub trait BeatDetector {
    /// Feed one sample. Returns `true` at most once per heartbeat.
    fn check(&mut self, intensity: u32) -> bool;
}

/// Half of a symmetric 23-tap low-pass; the last entry is the centre tap.
const FIR_COEFFS: [i64; 12] = [
    172, 321, 579, 927, 1360, 1858, 2390, 2916, 3391, 3768, 4012, 4096,
];
const FIR_BUFFER_LEN: usize = 32;

/// Swing limits (filtered counts) for a crossing to count as a beat.
const MIN_SWING: i32 = 20;
const MAX_SWING: i32 = 1000;

#[derive(Debug, Clone)]
pub struct PbaBeatDetector {
    dc_register: i64,
    fir_buffer: [i32; FIR_BUFFER_LEN],
    fir_offset: usize,

    current: i32,
    previous: i32,

    swing_max: i32,
    swing_min: i32,
    cycle_max: i32,
    cycle_min: i32,

    rising: bool,
    falling: bool,
}

impl Default for PbaBeatDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PbaBeatDetector {
    pub const fn new() -> Self {
        Self {
            dc_register: 0,
            fir_buffer: [0; FIR_BUFFER_LEN],
            fir_offset: 0,
            current: 0,
            previous: 0,
            swing_max: MIN_SWING,
            swing_min: -MIN_SWING,
            cycle_max: 0,
            cycle_min: 0,
            rising: false,
            falling: false,
        }
    }

    /// Running DC estimate, alpha = 1/16 in Q15.
    fn estimate_dc(&mut self, sample: u32) -> i64 {
        self.dc_register += ((i64::from(sample) << 15) - self.dc_register) >> 4;
        self.dc_register >> 15
    }

    fn low_pass(&mut self, input: i32) -> i32 {
        self.fir_buffer[self.fir_offset] = input;

        let tap = |buffer: &[i32; FIR_BUFFER_LEN], offset: usize, back: usize| {
            i64::from(buffer[(offset + FIR_BUFFER_LEN - back) % FIR_BUFFER_LEN])
        };

        let mut acc = FIR_COEFFS[11] * tap(&self.fir_buffer, self.fir_offset, 11);
        for (i, coeff) in FIR_COEFFS.iter().take(11).enumerate() {
            acc += coeff * tap(&self.fir_buffer, self.fir_offset, i);
            acc += coeff * tap(&self.fir_buffer, self.fir_offset, 22 - i);
        }

        self.fir_offset = (self.fir_offset + 1) % FIR_BUFFER_LEN;
        saturate(acc >> 15)
    }

    /// Last filtered AC value, for plotting and diagnostics.
    pub fn filtered(&self) -> i32 {
        self.current
    }
}

impl BeatDetector for PbaBeatDetector {
    fn check(&mut self, intensity: u32) -> bool {
        let mut beat = false;

        self.previous = self.current;
        let dc = self.estimate_dc(intensity);
        self.current = self.low_pass(saturate(i64::from(intensity) - dc));

        // Rising edge: close out the last cycle.
        if self.previous < 0 && self.current >= 0 {
            self.swing_max = self.cycle_max;
            self.swing_min = self.cycle_min;
            self.rising = true;
            self.falling = false;
            self.cycle_max = 0;

            let swing = i64::from(self.swing_max) - i64::from(self.swing_min);
            if swing > i64::from(MIN_SWING) && swing < i64::from(MAX_SWING) {
                beat = true;
            }
        }

        // Falling edge.
        if self.previous > 0 && self.current <= 0 {
            self.rising = false;
            self.falling = true;
            self.cycle_min = 0;
        }

        if self.rising && self.current > self.previous {
            self.cycle_max = self.current;
        }
        if self.falling && self.current < self.previous {
            self.cycle_min = self.current;
        }

        beat
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
