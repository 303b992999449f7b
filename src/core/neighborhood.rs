//! Window helpers shared by the per-pixel stages

use ndarray::{Array2, Zip};

/// Map a possibly out-of-range index back into `0..len` by edge-duplicating
/// reflection (`... c b a | a b c ... x y z | z y x ...`).
#[inline]
pub fn reflect_index(index: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    let period = 2 * n;
    let mut i = index.rem_euclid(period);
    if i >= n {
        i = period - 1 - i;
    }
    i as usize
}

/// Sample `image` at `(i + di, j + dj)` with reflected borders
#[inline]
pub fn sample_reflected<T: Copy>(image: &Array2<T>, i: usize, j: usize, di: isize, dj: isize) -> T {
    let (height, width) = image.dim();
    let ii = reflect_index(i as isize + di, height);
    let jj = reflect_index(j as isize + dj, width);
    image[[ii, jj]]
}

/// Fill every element of `out` with `f(row, col)`.
///
/// Each output pixel must depend only on immutable inputs captured by `f`;
/// results are identical with and without the `parallel` feature.
pub fn fill_indexed<T, F>(out: &mut Array2<T>, f: F)
where
    T: Send,
    F: Fn(usize, usize) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        Zip::indexed(out).par_for_each(|(i, j), value| *value = f(i, j));
    }

    #[cfg(not(feature = "parallel"))]
    {
        Zip::indexed(out).for_each(|(i, j), value| *value = f(i, j));
    }
}
