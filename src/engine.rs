//! SPI slave transfer engine
//!
//! The bus master clocks one byte at a time. The first byte of every
//! six-byte cycle is a command selecting a triple, the answer is the
//! selected `X`, `Y`, `Z` values as big-endian `i16`:
//!
//! | exchange | master sends | engine returns |
//! |----------|--------------|----------------|
//! | 1        | command      | previous `Z_low` |
//! | 2        | don't care   | `X_high`       |
//! | 3        | don't care   | `X_low`        |
//! | 4        | don't care   | `Y_high`       |
//! | 5        | don't care   | `Y_low`        |
//! | 6        | don't care   | `Z_high`       |
//! | 7 = 1    | next command | `Z_low`        |
//!
//! The one-exchange lag comes from the full-duplex data register: the byte
//! loaded by the interrupt handler is only shifted out on the next
//! exchange. [`SpiSlavePort`] models that register for host-side use.

use accelerometer::vector::I16x3;

use crate::buffer::TripleSource;

/// Command byte selecting the acceleration triple (`'a'`)
pub const ACCEL_TAG: u8 = 0x61;
/// Command byte selecting the angular rate triple (`'g'`)
pub const GYRO_TAG: u8 = 0x67;
/// Command byte selecting the temperature triple (`'t'`)
pub const TEMP_TAG: u8 = 0x74;

/// Triple streamed during the current cycle
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Selection {
    /// Accelerometer `X`, `Y`, `Z`
    Acceleration,
    /// Gyroscope `X`, `Y`, `Z`
    AngularRate,
    /// Temperature in °C, replicated in all three components
    Temperature,
    /// Unknown command, all components zero
    Null,
}

impl Selection {
    /// Decode a command byte, unknown values select [`Selection::Null`]
    pub fn from_command(cmd: u8) -> Self {
        match cmd {
            ACCEL_TAG => Selection::Acceleration,
            GYRO_TAG => Selection::AngularRate,
            TEMP_TAG => Selection::Temperature,
            _ => Selection::Null,
        }
    }

    /// Command byte selecting this triple, `None` for [`Selection::Null`]
    pub fn command(self) -> Option<u8> {
        match self {
            Selection::Acceleration => Some(ACCEL_TAG),
            Selection::AngularRate => Some(GYRO_TAG),
            Selection::Temperature => Some(TEMP_TAG),
            Selection::Null => None,
        }
    }
}

/// Component of a triple
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    /// `X` component
    X,
    /// `Y` component
    Y,
    /// `Z` component
    Z,
}

impl Slot {
    fn next(self) -> Self {
        match self {
            Slot::X => Slot::Y,
            Slot::Y => Slot::Z,
            Slot::Z => Slot::X,
        }
    }

    fn pick(self, triple: &I16x3) -> i16 {
        match self {
            Slot::X => triple.x,
            Slot::Y => triple.y,
            Slot::Z => triple.z,
        }
    }
}

/// Byte of a 16-bit value
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Half {
    /// Bits 15..8, sent first
    High,
    /// Bits 7..0
    Low,
}

/// Position within the six-byte output sequence
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cursor {
    /// Component in flight
    pub slot: Slot,
    /// Byte of the component produced next
    pub half: Half,
}

impl Cursor {
    /// Start of a cycle, `X` high byte
    pub const START: Cursor = Cursor {
        slot: Slot::X,
        half: Half::High,
    };

    /// `true` at the start of a cycle, where the command byte is latched
    pub fn is_start(self) -> bool {
        self == Self::START
    }

    fn advance(self) -> Self {
        match self.half {
            Half::High => Cursor {
                slot: self.slot,
                half: Half::Low,
            },
            Half::Low => Cursor {
                slot: self.slot.next(),
                half: Half::High,
            },
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::START
    }
}

/// High byte of a big-endian `i16`
#[inline]
pub fn high_byte(value: i16) -> u8 {
    ((value >> 8) & 0xFF) as u8
}

/// Low byte of a big-endian `i16`
#[inline]
pub fn low_byte(value: i16) -> u8 {
    (value & 0xFF) as u8
}

/// Complete protocol state
///
/// [`EngineState::step`] is a total function of the state, the received
/// byte and the sample source: no bus access, no waiting, constant time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EngineState {
    selection: Selection,
    /// Values streamed during the current cycle
    snapshot: I16x3,
    cursor: Cursor,
}

impl EngineState {
    /// Initial state: nothing selected, cursor at the start of a cycle
    pub fn new() -> Self {
        Self {
            selection: Selection::Null,
            snapshot: I16x3::new(0, 0, 0),
            cursor: Cursor::START,
        }
    }

    /// Latched selection
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Position of the next byte
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Consume one received byte, produce the byte to load for the next
    /// exchange
    ///
    /// At the start of a cycle the received byte is decoded as a command
    /// and the selected triple is copied out of `source`, so all six bytes
    /// of a cycle belong to the same sample. Every other received byte is
    /// ignored.
    pub fn step<S>(self, rx: u8, source: &S) -> (Self, u8)
    where
        S: TripleSource + ?Sized,
    {
        let mut next = self;
        if self.cursor.is_start() {
            next.selection = Selection::from_command(rx);
            next.snapshot = match next.selection {
                Selection::Null => I16x3::new(0, 0, 0),
                sel => source.triple(sel),
            };
        }

        let value = next.cursor.slot.pick(&next.snapshot);
        let tx = match next.cursor.half {
            Half::High => high_byte(value),
            Half::Low => low_byte(value),
        };
        next.cursor = next.cursor.advance();
        (next, tx)
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt-side driver of the transfer protocol
///
/// Call [`TransferEngine::service`] from the SPI transfer-complete
/// interrupt with the byte just received and load the result into the
/// data register.
pub struct TransferEngine<S> {
    source: S,
    state: EngineState,
}

impl<S> TransferEngine<S>
where
    S: TripleSource,
{
    /// Create an engine reading from `source`
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: EngineState::new(),
        }
    }

    /// Handle one exchange, returns the byte for the next one
    #[inline]
    pub fn service(&mut self, rx: u8) -> u8 {
        let (state, tx) = self.state.step(rx, &self.source);
        self.state = state;
        tx
    }

    /// Drop the current cycle and wait for a new command,
    /// e.g. on a chip-select edge
    pub fn reset(&mut self) {
        self.state = EngineState::new();
    }

    /// Latched selection
    pub fn selection(&self) -> Selection {
        self.state.selection()
    }

    /// Position of the next byte
    pub fn cursor(&self) -> Cursor {
        self.state.cursor()
    }

    /// Destroy engine instance, return the sample source
    pub fn destroy(self) -> S {
        self.source
    }
}

/// Full-duplex data register in front of a [`TransferEngine`]
///
/// [`SpiSlavePort::exchange`] returns what the master would receive while
/// sending `rx`: the byte loaded during the previous exchange.
pub struct SpiSlavePort<S> {
    engine: TransferEngine<S>,
    /// Byte shifted out on the next exchange
    loaded: u8,
}

impl<S> SpiSlavePort<S>
where
    S: TripleSource,
{
    /// Wrap `engine`, the data register starts out zero
    pub fn new(engine: TransferEngine<S>) -> Self {
        Self { engine, loaded: 0 }
    }

    /// One master-clocked byte exchange
    pub fn exchange(&mut self, rx: u8) -> u8 {
        let tx = self.loaded;
        self.loaded = self.engine.service(rx);
        tx
    }

    /// Exchange every byte of `words`, replacing each with the byte received
    pub fn transfer_in_place(&mut self, words: &mut [u8]) {
        for w in words.iter_mut() {
            *w = self.exchange(*w);
        }
    }

    /// Access the wrapped engine
    pub fn engine(&self) -> &TransferEngine<S> {
        &self.engine
    }

    /// Destroy port instance, return the engine
    pub fn destroy(self) -> TransferEngine<S> {
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::buffer::SampleBuffer;

    struct Fixed(I16x3);

    impl TripleSource for Fixed {
        fn triple(&self, selection: Selection) -> I16x3 {
            match selection {
                Selection::Null => I16x3::new(0, 0, 0),
                _ => self.0,
            }
        }
    }

    struct Counting {
        reads: Cell<usize>,
    }

    impl TripleSource for Counting {
        fn triple(&self, _selection: Selection) -> I16x3 {
            self.reads.set(self.reads.get() + 1);
            I16x3::new(1, 2, 3)
        }
    }

    fn cycle<S: TripleSource>(engine: &mut TransferEngine<S>, cmd: u8) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[0] = engine.service(cmd);
        for b in out.iter_mut().skip(1) {
            *b = engine.service(0xFF);
        }
        out
    }

    fn sample_buffer() -> SampleBuffer {
        let buf = SampleBuffer::new();
        buf.publish(
            I16x3::new(4660, 22136, 30612),
            I16x3::new(10072, 9029, -26505),
            I16x3::new(24, 24, 24),
        );
        buf
    }

    #[test]
    fn byte_split_roundtrip() {
        for v in [i16::MIN, -26505, -256, -1, 0, 1, 255, 256, 4660, i16::MAX] {
            let joined = ((u16::from(high_byte(v)) << 8) | u16::from(low_byte(v))) as i16;
            assert_eq!(joined, v);
        }
    }

    #[test]
    fn command_decoding() {
        assert_eq!(Selection::from_command(b'a'), Selection::Acceleration);
        assert_eq!(Selection::from_command(b'g'), Selection::AngularRate);
        assert_eq!(Selection::from_command(b't'), Selection::Temperature);
        assert_eq!(Selection::from_command(0x00), Selection::Null);
        assert_eq!(Selection::from_command(b'A'), Selection::Null);
        assert_eq!(Selection::Temperature.command(), Some(TEMP_TAG));
        assert_eq!(Selection::Null.command(), None);
    }

    #[test]
    fn accel_cycle_bytes() {
        let mut engine = TransferEngine::new(Fixed(I16x3::new(4660, 22136, 30612)));
        assert_eq!(cycle(&mut engine, ACCEL_TAG), [0x12, 0x34, 0x56, 0x78, 0x77, 0x94]);
        assert_eq!(engine.cursor(), Cursor::START);
        assert_eq!(engine.selection(), Selection::Acceleration);
    }

    #[test]
    fn cursor_ring() {
        let mut engine = TransferEngine::new(Fixed(I16x3::new(0, 0, 0)));
        let expected = [
            (Slot::X, Half::Low),
            (Slot::Y, Half::High),
            (Slot::Y, Half::Low),
            (Slot::Z, Half::High),
            (Slot::Z, Half::Low),
            (Slot::X, Half::High),
        ];
        for (slot, half) in expected {
            engine.service(ACCEL_TAG);
            assert_eq!(engine.cursor(), Cursor { slot, half });
        }
    }

    #[test]
    fn command_latched_once_per_cycle() {
        let buf = sample_buffer();
        let mut engine = TransferEngine::new(&buf);

        assert_eq!(engine.service(GYRO_TAG), high_byte(10072));
        assert_eq!(engine.selection(), Selection::AngularRate);

        // mid-cycle command bytes are data, not commands
        for rx in [ACCEL_TAG, TEMP_TAG, ACCEL_TAG, 0x00, ACCEL_TAG] {
            engine.service(rx);
            assert_eq!(engine.selection(), Selection::AngularRate);
        }

        assert_eq!(engine.service(ACCEL_TAG), high_byte(4660));
        assert_eq!(engine.selection(), Selection::Acceleration);
    }

    #[test]
    fn unknown_command_zeros() {
        let buf = sample_buffer();
        let mut engine = TransferEngine::new(&buf);
        assert_eq!(cycle(&mut engine, 0x00), [0; 6]);
        assert_eq!(cycle(&mut engine, b'x'), [0; 6]);
        assert_eq!(engine.selection(), Selection::Null);
    }

    #[test]
    fn temperature_cycle() {
        let buf = sample_buffer();
        let mut engine = TransferEngine::new(&buf);
        assert_eq!(cycle(&mut engine, TEMP_TAG), [0, 24, 0, 24, 0, 24]);
    }

    #[test]
    fn negative_values_big_endian() {
        let buf = sample_buffer();
        let mut engine = TransferEngine::new(&buf);
        // 10072 = 0x2758, 9029 = 0x2345, -26505 = 0x9877
        assert_eq!(cycle(&mut engine, GYRO_TAG), [0x27, 0x58, 0x23, 0x45, 0x98, 0x77]);
    }

    #[test]
    fn repeated_cycles_identical() {
        let buf = sample_buffer();
        let mut engine = TransferEngine::new(&buf);
        let first = cycle(&mut engine, ACCEL_TAG);
        let second = cycle(&mut engine, ACCEL_TAG);
        assert_eq!(first, second);
    }

    #[test]
    fn publish_mid_cycle_not_torn() {
        let buf = sample_buffer();
        let mut engine = TransferEngine::new(&buf);

        let mut out = [0u8; 6];
        out[0] = engine.service(ACCEL_TAG);
        out[1] = engine.service(0);
        out[2] = engine.service(0);
        buf.publish(
            I16x3::new(-1, -1, -1),
            I16x3::new(0, 0, 0),
            I16x3::new(0, 0, 0),
        );
        out[3] = engine.service(0);
        out[4] = engine.service(0);
        out[5] = engine.service(0);
        assert_eq!(out, [0x12, 0x34, 0x56, 0x78, 0x77, 0x94]);

        // new sample shows up on the next cycle
        assert_eq!(cycle(&mut engine, ACCEL_TAG), [0xFF; 6]);
    }

    #[test]
    fn source_read_once_per_cycle() {
        let source = Counting {
            reads: Cell::new(0),
        };
        let mut engine = TransferEngine::new(&source);
        cycle(&mut engine, ACCEL_TAG);
        assert_eq!(source.reads.get(), 1);
        cycle(&mut engine, GYRO_TAG);
        assert_eq!(source.reads.get(), 2);
        cycle(&mut engine, 0x00);
        assert_eq!(source.reads.get(), 2);
    }

    #[test]
    fn reset_restarts_cycle() {
        let buf = sample_buffer();
        let mut engine = TransferEngine::new(&buf);
        engine.service(GYRO_TAG);
        engine.service(0);
        engine.service(0);
        engine.reset();
        assert_eq!(engine.cursor(), Cursor::START);
        assert_eq!(engine.selection(), Selection::Null);
        assert_eq!(cycle(&mut engine, ACCEL_TAG), [0x12, 0x34, 0x56, 0x78, 0x77, 0x94]);
    }

    #[test]
    fn port_lags_one_exchange() {
        let buf = sample_buffer();
        let mut port = SpiSlavePort::new(TransferEngine::new(&buf));

        // nothing loaded yet on the very first exchange
        assert_eq!(port.exchange(ACCEL_TAG), 0x00);

        let mut rx = [0u8; 6];
        rx[5] = GYRO_TAG;
        port.transfer_in_place(&mut rx);
        assert_eq!(rx, [0x12, 0x34, 0x56, 0x78, 0x77, 0x94]);

        let mut rx = [0u8; 6];
        rx[5] = GYRO_TAG;
        port.transfer_in_place(&mut rx);
        assert_eq!(rx, [0x27, 0x58, 0x23, 0x45, 0x98, 0x77]);
        assert_eq!(port.engine().selection(), Selection::AngularRate);
    }

    #[test]
    fn pure_step() {
        let source = Fixed(I16x3::new(0x0102, 0x0304, 0x0506));
        let mut state = EngineState::new();
        let mut out = [0u8; 6];
        for (i, b) in out.iter_mut().enumerate() {
            let rx = if i == 0 { ACCEL_TAG } else { 0 };
            let (next, tx) = state.step(rx, &source);
            state = next;
            *b = tx;
        }
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
        assert_eq!(state.cursor(), Cursor::START);
    }
}
