use rand::rngs::OsRng;
use rand::Rng;

/// Picks a uniformly random index into a pool of `len` candidates using the
/// operating system's CSPRNG. Returns `None` for an empty pool.
pub fn pick_index(len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(OsRng.gen_range(0..len))
}
