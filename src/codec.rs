//! Transactions and how they map onto bus beats.

use rand::{Rng, RngCore};
use std::fmt;

use crate::axis::{Beat, HandshakePins};
use crate::error::{Error, Result};
use crate::value::LogicVec;

/// Unit of data checked end to end.
pub trait Transaction: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Human readable form used in logs and mismatch reports.
    fn describe(&self) -> String;
}

impl Transaction for LogicVec {
    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Variable length byte payload.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Transaction for Frame {
    fn describe(&self) -> String {
        let hex: Vec<String> = self.0.iter().map(|b| format!("{b:02x}")).collect();
        format!("[{}] {}", self.0.len(), hex.join("-"))
    }
}

/// Maps transactions to beats and back, and generates random ones.
pub trait Codec: Send + Sync + 'static {
    type Item: Transaction;
    type Decoder: Default + Send;

    fn generate(&self, rng: &mut dyn RngCore) -> Self::Item;
    fn encode(&self, item: &Self::Item) -> Vec<Beat>;
    /// Feeds one accepted beat, returns the transaction it completes, if any.
    fn decode(&self, state: &mut Self::Decoder, beat: Beat) -> Option<Self::Item>;
    /// Checks that the bus can carry what this codec produces.
    fn check_bus<P: HandshakePins>(&self, pins: &P) -> Result<()>;
    /// Rejects a scripted item this codec could never have generated.
    fn validate(&self, item: &Self::Item) -> Result<()>;
}

/// One fixed width word per beat.
#[derive(Clone, Copy, Debug)]
pub struct WordCodec {
    data_width: u32,
}

impl WordCodec {
    pub fn new(data_width: u32) -> Result<Self> {
        if data_width == 0 {
            return Err(Error::Config("data width must be at least 1 bit".into()));
        }
        Ok(Self { data_width })
    }
    pub fn data_width(&self) -> u32 {
        self.data_width
    }
}

impl Codec for WordCodec {
    type Item = LogicVec;
    type Decoder = ();

    fn generate(&self, rng: &mut dyn RngCore) -> LogicVec {
        let mut bytes = vec![0u8; self.data_width.div_ceil(8) as usize];
        rng.fill_bytes(&mut bytes);
        LogicVec::from_bytes(self.data_width, &bytes)
    }
    fn encode(&self, item: &LogicVec) -> Vec<Beat> {
        vec![Beat::word(item.clone())]
    }
    fn decode(&self, _state: &mut (), beat: Beat) -> Option<LogicVec> {
        Some(LogicVec::from_bytes(self.data_width, beat.data.as_bytes()))
    }
    fn check_bus<P: HandshakePins>(&self, pins: &P) -> Result<()> {
        if pins.data_width() != self.data_width {
            return Err(Error::Config(format!(
                "word codec is {} bits wide, bus is {} bits",
                self.data_width,
                pins.data_width()
            )));
        }
        Ok(())
    }
    fn validate(&self, item: &LogicVec) -> Result<()> {
        if item.width() != self.data_width {
            return Err(Error::Config(format!(
                "word {item} is {} bits wide, codec is {} bits",
                item.width(),
                self.data_width
            )));
        }
        Ok(())
    }
}

/// Frames of 1 to `payload_max` bytes, split into beats of `bus_bytes` bytes.
/// The final beat has `last` set and `keep` marks its valid bytes.
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    payload_max: usize,
    bus_bytes: usize,
}

impl FrameCodec {
    pub fn new(payload_max: usize, bus_bytes: usize) -> Result<Self> {
        if payload_max == 0 {
            return Err(Error::Config("payload_max must be at least 1 byte".into()));
        }
        if bus_bytes == 0 {
            return Err(Error::Config("bus must be at least 1 byte wide".into()));
        }
        Ok(Self { payload_max, bus_bytes })
    }
    pub fn payload_max(&self) -> usize {
        self.payload_max
    }
    pub fn bus_bytes(&self) -> usize {
        self.bus_bytes
    }
}

impl Codec for FrameCodec {
    type Item = Frame;
    type Decoder = Vec<u8>;

    fn generate(&self, rng: &mut dyn RngCore) -> Frame {
        let len = rng.gen_range(1..=self.payload_max);
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        Frame(bytes)
    }
    fn encode(&self, item: &Frame) -> Vec<Beat> {
        let width = (self.bus_bytes * 8) as u32;
        let chunks: Vec<&[u8]> = item.0.chunks(self.bus_bytes).collect();
        let n = chunks.len();
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut keep = LogicVec::zero(self.bus_bytes as u32);
                for b in 0..chunk.len() {
                    keep.set_bit(b as u32, true);
                }
                Beat {
                    data: LogicVec::from_bytes(width, chunk),
                    keep: Some(keep),
                    last: i + 1 == n,
                }
            })
            .collect()
    }
    fn decode(&self, state: &mut Vec<u8>, beat: Beat) -> Option<Frame> {
        let bytes = beat.data.as_bytes();
        match &beat.keep {
            Some(keep) => state.extend(
                bytes.iter().enumerate().filter(|(i, _)| keep.bit(*i as u32)).map(|(_, b)| *b),
            ),
            None => state.extend_from_slice(bytes),
        }
        beat.last.then(|| Frame(std::mem::take(state)))
    }
    fn check_bus<P: HandshakePins>(&self, pins: &P) -> Result<()> {
        if pins.data_width() as usize != self.bus_bytes * 8 {
            return Err(Error::Config(format!(
                "frame codec needs a {} byte bus, bus is {} bits",
                self.bus_bytes,
                pins.data_width()
            )));
        }
        // a short final beat is only distinguishable from padding by tkeep
        if self.bus_bytes > 1 && pins.keep_width() == 0 {
            return Err(Error::Config("frames on a multi byte bus need a tkeep signal".into()));
        }
        if self.payload_max > self.bus_bytes && !pins.has_last() {
            return Err(Error::Config("multi beat frames need a tlast signal".into()));
        }
        Ok(())
    }
    fn validate(&self, item: &Frame) -> Result<()> {
        if item.is_empty() || item.len() > self.payload_max {
            return Err(Error::Config(format!(
                "frame of {} bytes outside 1..={}",
                item.len(),
                self.payload_max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::Trigger;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    /// Bus that only reports its shape.
    #[derive(Clone)]
    struct Shape {
        data_width: u32,
        keep_width: u32,
        last: bool,
    }

    impl HandshakePins for Shape {
        fn assert(&self, _beat: &Beat) -> Result<()> {
            Ok(())
        }
        fn deassert(&self) -> Result<()> {
            Ok(())
        }
        fn read_valid(&self) -> Result<bool> {
            Ok(false)
        }
        fn read_ready(&self) -> Result<bool> {
            Ok(false)
        }
        fn read_data(&self) -> Result<Beat> {
            Ok(Beat::word(LogicVec::zero(self.data_width)))
        }
        fn write_ready(&self, _ready: bool) -> Result<()> {
            Ok(())
        }
        fn next_edge(&self) -> Trigger {
            Trigger::timer_steps(1)
        }
        fn data_width(&self) -> u32 {
            self.data_width
        }
        fn keep_width(&self) -> u32 {
            self.keep_width
        }
        fn has_last(&self) -> bool {
            self.last
        }
    }

    fn shape(bus_bytes: u32, keep: bool, last: bool) -> Shape {
        Shape {
            data_width: bus_bytes * 8,
            keep_width: if keep { bus_bytes } else { 0 },
            last,
        }
    }

    #[test]
    fn frame_beats_mark_valid_bytes_and_last() {
        let codec = FrameCodec::new(8, 2).unwrap();
        let beats = codec.encode(&Frame::new([1, 2, 3]));
        assert_eq!(beats.len(), 2);
        assert!(!beats[0].last && beats[1].last);
        assert_eq!(beats[0].data.as_bytes(), &[1, 2]);
        assert_eq!(beats[1].data.as_bytes(), &[3, 0]);
        assert_eq!(beats[1].keep.as_ref().map(|k| k.as_u64()), Some(0b01));
    }

    #[test]
    fn frames_survive_encode_decode() {
        let codec = FrameCodec::new(64, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = Vec::new();
        for _ in 0..20 {
            let frame = codec.generate(&mut rng);
            let mut out = None;
            for beat in codec.encode(&frame) {
                assert!(out.is_none(), "frame completed before its last beat");
                out = codec.decode(&mut state, beat);
            }
            assert_eq!(out, Some(frame));
        }
    }

    #[test]
    fn frame_lengths_cover_both_bounds() {
        let codec = FrameCodec::new(4, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let lens: Vec<usize> = (0..1000).map(|_| codec.generate(&mut rng).len()).collect();
        assert!(lens.iter().all(|l| (1..=4).contains(l)));
        assert!(lens.contains(&1));
        assert!(lens.contains(&4));
    }

    #[test]
    fn words_stay_within_width() {
        let codec = WordCodec::new(5).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!(codec.generate(&mut rng).as_u64() < 32);
        }
    }

    #[test]
    fn degenerate_codecs_are_rejected() {
        assert!(matches!(WordCodec::new(0), Err(Error::Config(_))));
        assert!(matches!(FrameCodec::new(0, 4), Err(Error::Config(_))));
        assert!(matches!(FrameCodec::new(4, 0), Err(Error::Config(_))));
    }

    #[rstest]
    #[case(FrameCodec::new(4, 4).unwrap(), shape(4, false, false), false)]
    #[case(FrameCodec::new(4, 4).unwrap(), shape(4, true, false), true)]
    #[case(FrameCodec::new(8, 4).unwrap(), shape(4, true, false), false)]
    #[case(FrameCodec::new(8, 4).unwrap(), shape(4, true, true), true)]
    #[case(FrameCodec::new(1, 1).unwrap(), shape(1, false, false), true)]
    #[case(FrameCodec::new(8, 4).unwrap(), shape(2, true, true), false)]
    fn frame_bus_needs_keep_and_last(#[case] codec: FrameCodec, #[case] bus: Shape, #[case] fits: bool) {
        assert_eq!(codec.check_bus(&bus).is_ok(), fits);
    }

    #[test]
    fn scripted_items_must_be_generatable() {
        let frames = FrameCodec::new(4, 2).unwrap();
        assert!(frames.validate(&Frame::new([1])).is_ok());
        assert!(frames.validate(&Frame::new([1, 2, 3, 4])).is_ok());
        assert!(matches!(frames.validate(&Frame::default()), Err(Error::Config(_))));
        assert!(matches!(frames.validate(&Frame::new([0; 5])), Err(Error::Config(_))));

        let words = WordCodec::new(8).unwrap();
        assert!(words.validate(&LogicVec::from_u64(8, 0xff)).is_ok());
        assert!(matches!(words.validate(&LogicVec::from_u64(16, 1)), Err(Error::Config(_))));
    }

    #[test]
    fn frames_describe_as_dashed_hex() {
        assert_eq!(Frame::new([1, 2, 0xab]).describe(), "[3] 01-02-ab");
    }
}
