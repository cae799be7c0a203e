use anyhow::{Context, Result};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// One row of the synthetic export.
struct Sample {
    time: f64,
    potential: f64,
    current: f64,
    cycle: u32,
}

/// Cell potential along a half-cycle, `progress` in [0, 1].
fn potential_at(progress: f64, charging: bool) -> f64 {
    // Sloped plateau with steep ends; discharge sits lower (overpotential).
    let shape = 0.35 * progress + 0.15 * (8.0 * (progress - 0.5)).tanh();
    if charging {
        3.55 + shape
    } else {
        3.95 - shape - 0.08
    }
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let current_ma = 0.8;
    let dt = 10.0;
    let rest_samples = 30;
    let n_cycles = 5;

    let mut samples: Vec<Sample> = Vec::new();
    let mut t = 0.0;

    // Open-circuit rest before the test.
    for _ in 0..rest_samples {
        samples.push(Sample {
            time: t,
            potential: 3.4 + rng.gauss(0.0, 0.001),
            current: 0.0,
            cycle: 0,
        });
        t += dt;
    }

    for cycle in 1..=n_cycles {
        // Capacity fade: each half-cycle gets a little shorter.
        let half_len = 360 - 12 * (cycle as usize - 1);
        for charging in [true, false] {
            let sign = if charging { 1.0 } else { -1.0 };
            for k in 0..half_len {
                let progress = k as f64 / half_len as f64;
                samples.push(Sample {
                    time: t,
                    potential: potential_at(progress, charging) + rng.gauss(0.0, 0.002),
                    current: sign * current_ma + rng.gauss(0.0, 0.002),
                    cycle,
                });
                t += dt;
            }
        }
    }

    let output_path = "sample_cycling.txt";
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(output_path)
        .context("creating output file")?;
    writer.write_record(["time/s", "Ecell/V", "<I>/mA", "cycle number"])?;
    for s in &samples {
        writer.write_record([
            format!("{:.1}", s.time),
            format!("{:.5}", s.potential),
            format!("{:.5}", s.current),
            s.cycle.to_string(),
        ])?;
    }
    writer.flush()?;

    println!(
        "Wrote {} samples ({n_cycles} cycles at {current_ma} mA) to {output_path}",
        samples.len()
    );
    Ok(())
}
