use std::f64::consts::PI;

use approx::assert_relative_eq;
use num_complex::Complex;

use hoomd_md::fft::{Direction, LocalFftContext};

fn naive_dft(signal: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let n = signal.len();
    (0..n)
        .map(|k| {
            signal
                .iter()
                .enumerate()
                .map(|(j, x)| x * Complex::from_polar(1.0, -2.0 * PI * (j * k) as f64 / n as f64))
                .sum()
        })
        .collect()
}

#[test]
fn batched_forward_matches_naive_dft_and_inverts() {
    let ctx = LocalFftContext::init().unwrap();
    let (dim, howmany) = (32, 4);
    let bytes = dim * howmany * std::mem::size_of::<Complex<f64>>();
    let mut buffer = ctx.allocate_aligned::<f64>(bytes).unwrap();
    assert_eq!(buffer.as_ptr() as usize % 64, 0);

    for (i, x) in buffer.iter_mut().enumerate() {
        *x = Complex::new((0.3 * i as f64).sin(), (0.17 * i as f64).cos());
    }
    let original = buffer.to_vec();

    let mut plan = ctx
        .create_plan::<f64>(dim, howmany, 1, dim, 1, dim, Direction::Forward)
        .unwrap();
    ctx.execute_in_place(&mut buffer, &mut plan, Direction::Forward).unwrap();

    for b in 0..howmany {
        let expected = naive_dft(&original[b * dim..(b + 1) * dim]);
        for k in 0..dim {
            let got = buffer[b * dim + k];
            assert_relative_eq!(got.re, expected[k].re, epsilon = 1e-9);
            assert_relative_eq!(got.im, expected[k].im, epsilon = 1e-9);
        }
    }

    // inverse is unnormalized
    ctx.execute_in_place(&mut buffer, &mut plan, Direction::Inverse).unwrap();
    for (got, want) in buffer.iter().zip(original.iter()) {
        assert_relative_eq!(got.re / dim as f64, want.re, epsilon = 1e-12);
        assert_relative_eq!(got.im / dim as f64, want.im, epsilon = 1e-12);
    }

    ctx.destroy_plan(plan);
    ctx.free_aligned(buffer);
    assert_eq!(ctx.live_plans(), 0);
    ctx.teardown();
}

#[test]
fn single_precision_plans_work() {
    let ctx = LocalFftContext::init().unwrap();
    let mut plan = ctx.create_plan::<f32>(4, 1, 1, 4, 1, 4, Direction::Forward).unwrap();
    let input = vec![Complex::new(1.0f32, 0.0); 4];
    let mut output = vec![Complex::new(0.0f32, 0.0); 4];
    ctx.execute(&input, &mut output, &mut plan, Direction::Forward).unwrap();
    assert_relative_eq!(output[0].re, 4.0, epsilon = 1e-6);
    for x in &output[1..] {
        assert_relative_eq!(x.norm(), 0.0, epsilon = 1e-6);
    }
}
