use crate::config::{Number, EPSILON};
use wide::f32x8;

/// Inner product of two equal-length vectors using SIMD lanes of eight.
/// For vectors already normalized with [`normalize_vector`] this is the cosine similarity.
pub fn dot_product_simd(a: &[Number], b: &[Number]) -> Option<Number> {
    if a.len() != b.len() {
        return None;
    }

    let mut acc = f32x8::splat(0.0);

    let len = a.len();
    let simd_len = len - (len % 8);

    for i in (0..simd_len).step_by(8) {
        let va = f32x8::new([
            a[i],
            a[i + 1],
            a[i + 2],
            a[i + 3],
            a[i + 4],
            a[i + 5],
            a[i + 6],
            a[i + 7],
        ]);
        let vb = f32x8::new([
            b[i],
            b[i + 1],
            b[i + 2],
            b[i + 3],
            b[i + 4],
            b[i + 5],
            b[i + 6],
            b[i + 7],
        ]);
        acc += va * vb;
    }

    let mut dot = acc.reduce_add();

    // Tail
    for i in simd_len..len {
        dot += a[i] * b[i];
    }

    Some(dot)
}

/// Scale `vector` to unit length in place. Near-zero vectors are left untouched.
pub fn normalize_vector(vector: &mut [Number]) {
    let magnitude: Number = vector.iter().map(|&x| x * x).sum::<Number>().sqrt();
    if magnitude > EPSILON {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}
