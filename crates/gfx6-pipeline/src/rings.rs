//! Shader ring size requirements
//!
//! Pipelines report how large each shader ring's items must be; the device keeps the maximum
//! over all pipelines so the rings can be (re)allocated before the next submission.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shader rings whose sizes depend on the bound pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShaderRingType {
    GfxScratch,
    EsGs,
    GsVs,
    TfBuffer,
    OffChipLds,
}

impl ShaderRingType {
    pub const COUNT: usize = 5;
    pub const ALL: [ShaderRingType; Self::COUNT] = [Self::GfxScratch, Self::EsGs, Self::GsVs, Self::TfBuffer, Self::OffChipLds];
}

/// Item size requested for every ring, indexed by [`ShaderRingType`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShaderRingItemSizes {
    pub item_size: [u64; ShaderRingType::COUNT],
}

impl ShaderRingItemSizes {
    pub fn get(&self, ring: ShaderRingType) -> u64 {
        self.item_size[ring as usize]
    }

    pub fn set(&mut self, ring: ShaderRingType, size: u64) {
        self.item_size[ring as usize] = size;
    }
}

/// Device-wide maximum of every pipeline's ring item sizes
///
/// Updated concurrently by pipelines compiled on different threads.
#[derive(Debug, Default)]
pub struct LargestRingSizes {
    item_size: [AtomicU64; ShaderRingType::COUNT],
}

impl LargestRingSizes {
    /// Raises each ring's maximum to at least the requested size
    pub fn update(&self, sizes: &ShaderRingItemSizes) {
        for (largest, requested) in self.item_size.iter().zip(sizes.item_size) {
            largest.fetch_max(requested, Ordering::AcqRel);
        }
    }

    /// Returns the current maxima
    pub fn snapshot(&self) -> ShaderRingItemSizes {
        ShaderRingItemSizes { item_size: std::array::from_fn(|i| self.item_size[i].load(Ordering::Acquire)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_update_keeps_maximum() {
        let largest = LargestRingSizes::default();

        let mut first = ShaderRingItemSizes::default();
        first.set(ShaderRingType::EsGs, 64);
        first.set(ShaderRingType::GfxScratch, 10);
        largest.update(&first);

        let mut second = ShaderRingItemSizes::default();
        second.set(ShaderRingType::EsGs, 16);
        second.set(ShaderRingType::GfxScratch, 40);
        largest.update(&second);

        let snapshot = largest.snapshot();
        assert_eq!(snapshot.get(ShaderRingType::EsGs), 64);
        assert_eq!(snapshot.get(ShaderRingType::GfxScratch), 40);
        assert_eq!(snapshot.get(ShaderRingType::TfBuffer), 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let largest = Arc::new(LargestRingSizes::default());

        let handles: Vec<_> = (1..=8u64)
            .map(|i| {
                let largest = Arc::clone(&largest);
                std::thread::spawn(move || {
                    let mut sizes = ShaderRingItemSizes::default();
                    sizes.set(ShaderRingType::GsVs, i * 100);
                    largest.update(&sizes);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(largest.snapshot().get(ShaderRingType::GsVs), 800);
    }
}
