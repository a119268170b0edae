use crate::config::{Number, EPSILON};
use wide::f32x8;

const LANES: usize = 8;

fn lane(chunk: &[Number]) -> f32x8 {
    f32x8::new([
        chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
    ])
}

/// Squared Euclidean distance between two vectors of equal length using SIMD operations.
pub fn squared_l2_simd(a: &[Number], b: &[Number]) -> Number {
    debug_assert_eq!(a.len(), b.len(), "vector length mismatch");

    let mut acc = f32x8::splat(0.0);
    let a_chunks = a.chunks_exact(LANES);
    let b_chunks = b.chunks_exact(LANES);
    let (a_rest, b_rest) = (a_chunks.remainder(), b_chunks.remainder());

    for (ca, cb) in a_chunks.zip(b_chunks) {
        let diff = lane(ca) - lane(cb);
        acc += diff * diff;
    }

    let mut distance = acc.reduce_add();

    // Handle remaining elements
    for (x, y) in a_rest.iter().zip(b_rest) {
        let diff = x - y;
        distance += diff * diff;
    }

    distance
}

pub fn normalize_vector(vector: &mut [Number]) {
    let magnitude: Number = vector.iter().map(|&x| x * x).sum::<Number>().sqrt();
    if magnitude > EPSILON {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}
