use num_complex::Complex64;

/// Per-section delay line of a transposed direct form II biquad.
pub type SectionState = [f64; 2];

/// One biquad stage, normalized so that `a[0] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 3]) -> Self {
        let a0 = a[0];
        Biquad {
            b: [b[0] / a0, b[1] / a0, b[2] / a0],
            a: [1.0, a[1] / a0, a[2] / a0],
        }
    }

    #[inline]
    fn calculate_output(&self, input: f64, state: &mut SectionState) -> f64 {
        let output = self.b[0] * input + state[0];
        state[0] = self.b[1] * input - self.a[1] * output + state[1];
        state[1] = self.b[2] * input - self.a[2] * output;
        output
    }

    /// Delay line that holds this stage at rest for a constant unit input.
    fn step_steady_state(&self) -> SectionState {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let rhs0 = b1 - a1 * b0;
        let rhs1 = b2 - a2 * b0;
        let z0 = (rhs0 + rhs1) / (1.0 + a1 + a2);
        [z0, rhs1 - a2 * z0]
    }

    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        (self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2])
            / (self.a[0] + z_inv * self.a[1] + z_inv2 * self.a[2])
    }
}

/// A cascade of biquads, applied in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondOrderSections {
    sections: Vec<Biquad>,
}

impl SecondOrderSections {
    pub fn new(sections: Vec<Biquad>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Initial conditions for the step-response steady state of the cascade.
    ///
    /// Each stage's state is scaled by the DC gain of the stages before it.
    pub fn steady_state(&self) -> Vec<SectionState> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|section| {
                let [z0, z1] = section.step_steady_state();
                let zi = [scale * z0, scale * z1];
                scale *= section.dc_gain();
                zi
            })
            .collect()
    }

    /// Runs one sample through every stage, updating `state` in place.
    #[inline]
    pub fn process_sample(&self, input: f64, state: &mut [SectionState]) -> f64 {
        self.sections
            .iter()
            .zip(state.iter_mut())
            .fold(input, |x, (section, zi)| section.calculate_output(x, zi))
    }

    /// Filters a whole signal, carrying `state` across the call.
    pub fn filter_signal(&self, signal: &[f64], state: &mut [SectionState]) -> Vec<f64> {
        signal
            .iter()
            .map(|&x| self.process_sample(x, state))
            .collect()
    }

    /// Magnitude of the frequency response at `freq` Hz.
    pub fn gain_at(&self, freq: f64, fs: f64) -> f64 {
        let omega = 2.0 * std::f64::consts::PI * freq / fs;
        let z_inv = Complex64::from_polar(1.0, -omega);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |h, section| h * section.response(z_inv))
            .norm()
    }
}
