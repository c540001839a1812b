//! Sample buffer shared by the [`Sampler`](crate::Sampler) running in the
//! main loop and the [`TransferEngine`](crate::TransferEngine) running in
//! the SPI interrupt.
//!
//! Every component is a word-sized atomic, so a 16-bit value is never
//! observed half-written. On top of that the buffer keeps two banks: the
//! writer fills the back bank and then publishes it with a single release
//! store of the bank index. A reader that runs to completion between two
//! publishes (an interrupt handler preempting the main loop on a single
//! core) therefore always sees a triple from one sampling instant.

use core::sync::atomic::{AtomicI16, AtomicU32, AtomicU8, Ordering};

use accelerometer::vector::I16x3;

use crate::engine::Selection;

/// Read access to the most recent triples
///
/// Implementations must not block: [`TransferEngine`](crate::TransferEngine)
/// calls this from interrupt context.
pub trait TripleSource {
    /// Current value of the triple chosen by `selection`,
    /// all zero for [`Selection::Null`]
    fn triple(&self, selection: Selection) -> I16x3;
}

impl<T: TripleSource + ?Sized> TripleSource for &T {
    fn triple(&self, selection: Selection) -> I16x3 {
        (**self).triple(selection)
    }
}

struct AtomicTriple {
    x: AtomicI16,
    y: AtomicI16,
    z: AtomicI16,
}

impl AtomicTriple {
    const fn new() -> Self {
        Self {
            x: AtomicI16::new(0),
            y: AtomicI16::new(0),
            z: AtomicI16::new(0),
        }
    }

    fn load(&self) -> I16x3 {
        I16x3::new(
            self.x.load(Ordering::Relaxed),
            self.y.load(Ordering::Relaxed),
            self.z.load(Ordering::Relaxed),
        )
    }

    fn store(&self, v: I16x3) {
        self.x.store(v.x, Ordering::Relaxed);
        self.y.store(v.y, Ordering::Relaxed);
        self.z.store(v.z, Ordering::Relaxed);
    }
}

struct Bank {
    accel: AtomicTriple,
    gyro: AtomicTriple,
    temp: AtomicTriple,
}

impl Bank {
    const fn new() -> Self {
        Self {
            accel: AtomicTriple::new(),
            gyro: AtomicTriple::new(),
            temp: AtomicTriple::new(),
        }
    }
}

/// Double-buffered acceleration, angular rate and temperature triples
///
/// Single writer, single reader. The buffer is `const`-constructible so it
/// can live in a `static` that both the main loop and the interrupt
/// handler borrow:
///
/// ```
/// use mpu6050_spi_bridge::{SampleBuffer, TransferEngine};
///
/// static SAMPLES: SampleBuffer = SampleBuffer::new();
///
/// let mut engine = TransferEngine::new(&SAMPLES);
/// assert_eq!(engine.service(b'a'), 0x00);
/// ```
pub struct SampleBuffer {
    banks: [Bank; 2],
    /// Index of the bank readers should use
    front: AtomicU8,
    /// Number of completed publishes
    generation: AtomicU32,
}

impl SampleBuffer {
    /// Create a buffer with all triples zeroed
    pub const fn new() -> Self {
        Self {
            banks: [Bank::new(), Bank::new()],
            front: AtomicU8::new(0),
            generation: AtomicU32::new(0),
        }
    }

    /// Store a complete sample set and make it visible to the reader
    ///
    /// Must only be called from one context at a time.
    pub fn publish(&self, accel: I16x3, gyro: I16x3, temp: I16x3) {
        let back = self.front.load(Ordering::Relaxed) ^ 1;
        let bank = &self.banks[usize::from(back)];
        bank.accel.store(accel);
        bank.gyro.store(gyro);
        bank.temp.store(temp);
        self.front.store(back, Ordering::Release);

        // only the writer updates the counter, no read-modify-write needed
        let generation = self.generation.load(Ordering::Relaxed);
        self.generation
            .store(generation.wrapping_add(1), Ordering::Relaxed);
    }

    /// Number of sample sets published so far (wrapping)
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Relaxed)
    }

    fn front(&self) -> &Bank {
        let front = self.front.load(Ordering::Acquire);
        &self.banks[usize::from(front & 1)]
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TripleSource for SampleBuffer {
    fn triple(&self, selection: Selection) -> I16x3 {
        match selection {
            Selection::Acceleration => self.front().accel.load(),
            Selection::AngularRate => self.front().gyro.load(),
            Selection::Temperature => self.front().temp.load(),
            Selection::Null => I16x3::new(0, 0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed() {
        let buf = SampleBuffer::new();
        for sel in [
            Selection::Acceleration,
            Selection::AngularRate,
            Selection::Temperature,
            Selection::Null,
        ] {
            assert_eq!(buf.triple(sel), I16x3::new(0, 0, 0));
        }
        assert_eq!(buf.generation(), 0);
    }

    #[test]
    fn publish_replaces_all_triples() {
        let buf = SampleBuffer::new();
        buf.publish(
            I16x3::new(4660, 22136, 30612),
            I16x3::new(10072, 9029, -26505),
            I16x3::new(24, 24, 24),
        );
        assert_eq!(buf.triple(Selection::Acceleration), I16x3::new(4660, 22136, 30612));
        assert_eq!(buf.triple(Selection::AngularRate), I16x3::new(10072, 9029, -26505));
        assert_eq!(buf.triple(Selection::Temperature), I16x3::new(24, 24, 24));
        assert_eq!(buf.triple(Selection::Null), I16x3::new(0, 0, 0));
        assert_eq!(buf.generation(), 1);
    }

    #[test]
    fn alternate_banks_hold_latest() {
        let buf = SampleBuffer::new();
        for i in 1..=5i16 {
            buf.publish(I16x3::new(i, -i, i * 2), I16x3::new(0, 0, 0), I16x3::new(0, 0, 0));
            assert_eq!(buf.triple(Selection::Acceleration), I16x3::new(i, -i, i * 2));
        }
        assert_eq!(buf.generation(), 5);
    }

    #[test]
    fn reads_through_reference() {
        let buf = SampleBuffer::new();
        buf.publish(I16x3::new(1, 2, 3), I16x3::new(4, 5, 6), I16x3::new(7, 7, 7));
        let source = &buf;
        assert_eq!(TripleSource::triple(&source, Selection::AngularRate), I16x3::new(4, 5, 6));
    }
}
