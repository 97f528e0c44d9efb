use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that one context writes and others read without locking.
///
/// Control-rate tasks publish envelope gain and filter cutoff through these;
/// the render thread only ever loads.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_exact_bits() {
        let cell = AtomicF32::new(0.25);
        assert_eq!(cell.get(), 0.25);
        cell.set(-1.5e-7);
        assert_eq!(cell.get(), -1.5e-7);
    }
}
